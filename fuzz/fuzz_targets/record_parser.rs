#![no_main]

use libfuzzer_sys::fuzz_target;
use sdxfer::recorder::{format_row, header, parse_log};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Must never panic, whatever the log contains
        let _ = parse_log(input);

        // Any field text survives a write/read cycle
        let record = sdxfer::record::TransferRecord::new(input, 10, 5, 1.0, false, false, true);
        let log = format!("{}\n{}\n", header(), format_row(&record));
        let parsed = parse_log(&log).expect("formatted row must parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].file_name, input);
    }
});
