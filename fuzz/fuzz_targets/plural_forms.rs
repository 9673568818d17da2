#![no_main]

use libfuzzer_sys::fuzz_target;

use lingo::plural::PluralRule;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8 * 1024 {
        return;
    }
    let header = String::from_utf8_lossy(data);
    // Compilation must reject or degrade, never panic; evaluation is total.
    let rule = PluralRule::compile(Some(&header));
    for n in [0u64, 1, 2, 11, 102] {
        let _ = rule.index(n);
    }
});
