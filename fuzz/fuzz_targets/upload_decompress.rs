#![no_main]

use libfuzzer_sys::fuzz_target;
use sdxfer::codec::decompress;

fuzz_target!(|data: &[u8]| {
    // Arbitrary request bodies must decode or fail cleanly
    let _ = decompress(data);
});
