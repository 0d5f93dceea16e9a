#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spantab::tables::{Classification, ClassificationTable, ClassifiedSpan};

#[derive(Arbitrary, Debug)]
struct Input {
    spans: Vec<(u32, u16, u8, u8)>,
    query: (u32, u16),
}

fuzz_target!(|input: Input| {
    // Any span list, sorted or not, must survive optimize/expand unchanged
    let spans: Vec<ClassifiedSpan> = input
        .spans
        .iter()
        .map(|&(start, length, tag, scope)| ClassifiedSpan {
            start: start >> 1,
            length: length as u32,
            classification: Classification::new(format!("c{}", tag % 16), ""),
            local_scope_id: scope as u32,
            local_scope_depth: 0,
        })
        .collect();

    let mut table = ClassificationTable::from_spans(&spans);
    table.optimize().unwrap();
    assert_eq!(table.to_vec().unwrap(), spans);

    let _ = table.get_range(input.query.0, input.query.1 as u32).unwrap();
});
