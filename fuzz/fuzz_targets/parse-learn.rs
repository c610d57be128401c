#![no_main]

use flowlearn::engine::LearnAction;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Whatever parses must format into text that parses back to the
    // same action.
    if let Ok(learn) = text.parse::<LearnAction>() {
        assert_eq!(learn.to_string().parse::<LearnAction>(), Ok(learn));
    }
});
