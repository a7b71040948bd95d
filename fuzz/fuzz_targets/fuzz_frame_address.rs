#![no_main]
use libfuzzer_sys::fuzz_target;
use soc_traits::{Address, NarrowFrame};

fuzz_target!(|input: (u32, [u16; 4])| {
    let (id, words) = input;
    // Whatever decodes must survive a re-encode unchanged
    if let Ok(addr) = Address::unpack(id) {
        assert_eq!(Address::unpack(addr.pack()), Ok(addr));
    }
    let frame = NarrowFrame {
        id,
        len: 8,
        data: words,
    };
    let _ = (frame.word32(0), frame.f32_at(1), frame.i32_at(1));
});
