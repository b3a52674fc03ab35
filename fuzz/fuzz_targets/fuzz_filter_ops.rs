#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spui_dom::{ListReconciler, MemoryNode};
use spui_reactive::{Filter, ObservableVec};

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Push(Vec<i8>),
    Pop,
    Shift,
    Unshift(Vec<i8>),
    Reverse,
    Sort,
    SortDesc,
    Splice { start: i8, count: Option<u8>, items: Vec<i8> },
    Insert { index: u8, item: i8 },
    RemoveAt(u8),
    Clear,
    Refilter(i8),
    Batch(Vec<FuzzOp>),
}

fn apply(src: &ObservableVec<i8>, filter: &Filter<i8>, op: &FuzzOp, depth: u8) {
    match op {
        FuzzOp::Push(items) => {
            src.push(items.iter().copied());
        }
        FuzzOp::Pop => {
            src.pop();
        }
        FuzzOp::Shift => {
            src.shift();
        }
        FuzzOp::Unshift(items) => {
            src.unshift(items.iter().copied());
        }
        FuzzOp::Reverse => src.reverse(),
        FuzzOp::Sort => src.sort(),
        FuzzOp::SortDesc => src.sort_by(|a, b| b.cmp(a)),
        FuzzOp::Splice { start, count, items } => {
            src.splice(
                isize::from(*start),
                count.map(usize::from),
                items.iter().copied(),
            );
        }
        FuzzOp::Insert { index, item } => {
            let _ = src.insert(usize::from(*index), *item);
        }
        FuzzOp::RemoveAt(index) => {
            let _ = src.remove_at(usize::from(*index));
        }
        FuzzOp::Clear => {
            src.clear();
        }
        FuzzOp::Refilter(min) => {
            let min = *min;
            let _ = filter.set_predicate(move |v| *v >= min);
        }
        FuzzOp::Batch(ops) if depth < 4 => {
            src.batch(|| {
                for op in ops {
                    apply(src, filter, op, depth + 1);
                }
            });
        }
        FuzzOp::Batch(_) => {}
    }
}

fuzz_target!(|input: (Vec<i8>, Vec<FuzzOp>)| {
    let (initial, ops) = input;
    if initial.len() > 256 || ops.len() > 256 {
        return;
    }

    let src = ObservableVec::from_vec(initial);
    let filter = Filter::new(&src, |v: &i8| v % 2 == 0);
    let list = ListReconciler::new(MemoryNode::element("ul"), filter.derived(), |_, v, _| {
        MemoryNode::text(v.to_string())
    });

    for op in &ops {
        apply(&src, &filter, op, 0);
    }

    let predicate = filter.predicate();
    let expected: Vec<i8> = src.to_vec().into_iter().filter(|v| predicate(v)).collect();
    assert_eq!(filter.to_vec(), expected);

    let rendered: Vec<String> = list.nodes().iter().map(MemoryNode::text_content).collect();
    let want: Vec<String> = expected.iter().map(i8::to_string).collect();
    assert_eq!(rendered, want);
});
