#![no_main]

use flowlearn::engine::ActionList;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Padding may be laid out differently on input, so only the
    // decoded form must survive a round trip. Every decoded action
    // fit a 16-bit length on input, so it encodes again.
    if let Ok(actions) = ActionList::decode(data, 0) {
        let bytes = actions.to_bytes().unwrap();
        assert_eq!(ActionList::decode(&bytes, 0), Ok(actions));
    }
});
