//! Node-list behavior against the in-memory element tree.
//!
//! Every test renders models into a `ul` and checks, after each mutation,
//! that child `i` of the list carries the id of model `i`.

use std::cell::Cell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use spui_dom::{ElementList, MemoryNode, element_list, h};
use spui_reactive::{ObservableVec, Runtime, Stream};

// ── Helpers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Item {
    id: u32,
    order: i32,
}

impl Item {
    fn dom_id(&self) -> String {
        format!("item-{}", self.id)
    }
}

struct Fixture {
    rt: Runtime,
    page: MemoryNode,
    list: ElementList<Item>,
    models: ObservableVec<Item>,
    next_id: Cell<u32>,
    index_mismatch: Rc<Cell<bool>>,
}

impl Fixture {
    fn new(title: &str, check_index: bool) -> Self {
        let rt = Runtime::new();
        let models: ObservableVec<Item> = ObservableVec::new();
        let index_mismatch = Rc::new(Cell::new(false));
        let (r, m, flag) = (rt.clone(), models.clone(), Rc::clone(&index_mismatch));
        let list = element_list(&rt, "ul", &models, move |_, model: &Item, index| {
            if check_index && m.position(model) != Some(index) {
                flag.set(true);
            }
            h(&r, "div")
                .attr("id", model.dom_id())
                .text(format!("item: {}", model.id))
                .build()
        });
        let page = h(&rt, "div")
            .text(title)
            .child(list.root().clone())
            .build();
        let fixture = Self {
            rt,
            page,
            list,
            models,
            next_id: Cell::new(0),
            index_mismatch,
        };
        fixture.validate();
        fixture
    }

    fn item(&self) -> Item {
        self.item_ordered(0)
    }

    fn item_ordered(&self, order: i32) -> Item {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Item { id, order }
    }

    fn validate(&self) {
        let children = self.list.root().children();
        assert_eq!(children.len(), self.models.len());
        for (i, (model, node)) in self.models.to_vec().iter().zip(&children).enumerate() {
            assert_eq!(
                node.attribute("id"),
                Some(model.dom_id()),
                "child {i} does not render model {i}"
            );
            assert_eq!(self.list.node_for(model).as_ref(), Some(node));
        }
        assert!(!self.index_mismatch.get(), "factory saw a wrong index");
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Structural operations
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn push_single_element() {
    let d = Fixture::new("push single", true);
    d.models.push([d.item()]);
    d.validate();
    assert_eq!(d.page.child_count(), 2);
}

#[test]
fn push_multiple_element() {
    let d = Fixture::new("push multiple", true);
    for _ in 0..3 {
        d.models.push([d.item()]);
    }
    d.validate();
}

#[test]
fn push_multi() {
    let d = Fixture::new("push multi", true);
    d.models.push([d.item(), d.item(), d.item()]);
    d.validate();
}

#[test]
fn pop() {
    let d = Fixture::new("pop", true);
    d.models.push([d.item(), d.item()]);
    d.validate();
    let popped = d.models.pop();
    d.validate();
    assert!(popped.is_some_and(|m| d.list.node_for(&m).is_none()));
}

#[test]
fn reverse() {
    let d = Fixture::new("reverse", true);
    d.models.push([d.item(), d.item(), d.item()]);
    let before = d.list.reconciler().nodes();
    d.models.reverse();
    d.validate();
    let after = d.list.reconciler().nodes();
    assert!(before.iter().rev().eq(after.iter()));
}

#[test]
fn splice_delete_til_end() {
    let d = Fixture::new("splice delete til end", true);
    d.models.push([d.item(), d.item(), d.item()]);
    d.models.splice(1, None, []);
    d.validate();
    assert_eq!(d.models.len(), 1);
}

#[test]
fn splice_delete_2() {
    let d = Fixture::new("splice delete 2", true);
    d.models.push([d.item(), d.item(), d.item(), d.item()]);
    d.models.splice(1, Some(2), []);
    d.validate();
}

#[test]
fn splice_delete_and_add() {
    let d = Fixture::new("splice delete and add", true);
    d.models.push([d.item(), d.item(), d.item(), d.item()]);
    d.models.splice(1, Some(2), [d.item(), d.item()]);
    d.validate();
}

#[test]
fn splice_add() {
    let d = Fixture::new("splice add", true);
    d.models.push([d.item(), d.item(), d.item(), d.item()]);
    d.models.splice(1, Some(0), [d.item(), d.item()]);
    d.validate();
    assert_eq!(d.models.len(), 6);
}

#[test]
fn splice_negative_start() {
    let d = Fixture::new("splice negative", true);
    d.models.push([d.item(), d.item(), d.item(), d.item()]);
    d.models.splice(-2, Some(1), [d.item()]);
    d.validate();
}

#[test]
fn shift() {
    let d = Fixture::new("shift", true);
    d.models.push([d.item(), d.item(), d.item()]);
    d.models.shift();
    d.validate();
}

#[test]
fn sort_moves_existing_nodes() {
    let d = Fixture::new("sort", true);
    d.models.push([
        d.item_ordered(10),
        d.item_ordered(5),
        d.item_ordered(20),
        d.item_ordered(15),
    ]);
    let nodes = d.list.reconciler().nodes();
    d.models.sort_by_key(|m| m.order);
    d.validate();
    let sorted = d.list.reconciler().nodes();
    assert_eq!(sorted, vec![
        nodes[1].clone(),
        nodes[0].clone(),
        nodes[3].clone(),
        nodes[2].clone(),
    ]);
}

#[test]
fn unshift_single() {
    let d = Fixture::new("unshift single", true);
    d.models.push([d.item(), d.item()]);
    d.models.unshift([d.item()]);
    d.validate();
}

#[test]
fn unshift_multiple() {
    let d = Fixture::new("unshift multiple", true);
    d.models.push([d.item(), d.item()]);
    d.models.unshift([d.item(), d.item()]);
    d.validate();
}

#[test]
fn pop_and_shift_on_empty_are_noops() {
    let d = Fixture::new("empty", true);
    assert!(d.models.pop().is_none());
    assert!(d.models.shift().is_none());
    d.validate();
}

// ═════════════════════════════════════════════════════════════════════════
// Batches (indices seen by the factory are replay positions, not final ones)
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn changes_push_and_unshift() {
    let d = Fixture::new("changes: push + unshift", false);
    d.models.batch(|| {
        d.models.push([d.item(), d.item()]);
        d.models.unshift([d.item(), d.item()]);
    });
    d.validate();
}

#[test]
fn changes_swap() {
    let d = Fixture::new("changes: swap", false);
    d.models.batch(|| {
        d.models.push([d.item(), d.item(), d.item(), d.item()]);
        let a = d.models.get(1).expect("second item");
        let b = d.models.get(2).expect("third item");
        d.models.splice(1, Some(1), [b]);
        d.models.splice(2, Some(1), [a]);
    });
    d.validate();
}

#[test]
fn list_after_existing_children_keeps_its_offset() {
    let rt = Runtime::new();
    let root = h(&rt, "ul").text("header").build();
    let models = ObservableVec::from_vec(vec![Item { id: 1, order: 0 }]);
    let r = rt.clone();
    let list = ElementList::new(root.clone(), &models, move |_, m: &Item, _| {
        h(&r, "li").attr("id", m.dom_id()).build()
    });
    models.unshift([Item { id: 0, order: 0 }]);
    models.push([Item { id: 2, order: 0 }]);
    models.reverse();

    assert_eq!(list.reconciler().offset(), 1);
    assert!(root.child(0).is_some_and(|c| c.is_text()));
    let ids: Vec<Option<String>> = root.children()[1..].iter().map(|c| c.attribute("id")).collect();
    assert_eq!(ids, vec![
        Some("item-2".to_owned()),
        Some("item-1".to_owned()),
        Some("item-0".to_owned()),
    ]);
}

// ═════════════════════════════════════════════════════════════════════════
// Auto-binding rows
// ═════════════════════════════════════════════════════════════════════════

struct RowData {
    id: u32,
    class: Stream<String>,
    text: Stream<String>,
}

/// Row model compared by identity.
#[derive(Clone)]
struct Row(Rc<RowData>);

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

fn bound_rows(rt: &Runtime) -> (ObservableVec<Row>, ElementList<Row>) {
    let models: ObservableVec<Row> = ObservableVec::new();
    let r = rt.clone();
    let list = element_list(rt, "ul", &models, move |_, row: &Row, _| {
        let (class, text) = (row.0.class.clone(), row.0.text.clone());
        h(&r, "div")
            .attr("id", format!("row-{}", row.0.id))
            .class_with(move || class.get())
            .text_with(move || text.get())
            .build()
    });
    (models, list)
}

fn row(rt: &Runtime, id: u32) -> Row {
    Row(Rc::new(RowData {
        id,
        class: Stream::new(rt, format!("row-{id}")),
        text: Stream::new(rt, format!("item: {id}")),
    }))
}

#[test]
fn modify_class() {
    let rt = Runtime::new();
    let (models, list) = bound_rows(&rt);
    let first = row(&rt, 1);
    models.push([first.clone()]);

    first.0.class.set("new-class".to_owned());
    let node = list.root().child(0).expect("row node");
    assert_eq!(node.class_name(), "new-class");
}

#[test]
fn modify_text() {
    let rt = Runtime::new();
    let (models, list) = bound_rows(&rt);
    let first = row(&rt, 1);
    models.push([first.clone()]);

    first.0.text.set("new-text".to_owned());
    assert_eq!(list.root().child(0).map(|n| n.text_content()).as_deref(), Some("new-text"));
}

#[test]
fn removed_rows_release_their_bindings() {
    let rt = Runtime::new();
    let (models, _list) = bound_rows(&rt);
    let first = row(&rt, 1);
    models.push([first.clone()]);
    assert_eq!(first.0.text.listener_count(), 1);

    models.pop();
    assert_eq!(first.0.text.listener_count(), 0);
    assert_eq!(first.0.class.listener_count(), 0);
}

#[test]
fn fixture_runtime_is_idle_after_edits() {
    let d = Fixture::new("idle", true);
    d.models.push([d.item(), d.item()]);
    d.models.reverse();
    assert_eq!(d.rt.depth(), 0);
    assert!(!d.rt.is_tracking());
}
