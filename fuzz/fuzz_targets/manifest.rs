#![no_main]

use bundlestore::manifest::{scan_package_info, JarManifestParser, ManifestParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = JarManifestParser.parse(&mut &data[..]);
    let _ = scan_package_info(data);
});
