use crate::classify::{Category, LocalPartition};

classify_impl!("scan_branchy");

#[cfg_attr(feature = "no_inline_sub_functions", inline(never))]
fn classify(v: &[u8], pivot: u8) -> LocalPartition {
    let mut out = LocalPartition::default();

    for &elem in v {
        match Category::of(elem, pivot) {
            Category::Smaller => out.smaller.push(elem),
            Category::Equal => out.equal.push(elem),
            Category::Larger => out.larger.push(elem),
        }
    }

    out
}
