//! Menu registry: ordered, grouped menu contents keyed by menu id.
//!
//! Items sort by group (items without a group last), then by `order`
//! (missing order counts as 0), then by registration order. Submenus refer
//! to other menus by id and are only followed when a menu is resolved, so a
//! cycle is reported by [`MenuRegistry::resolve_menu`] rather than at
//! registration.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use appmodel_api::{MenuItem, MenuNode, RegistryEvent};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::commands::CommandRegistry;
use crate::dispose::Disposer;
use crate::error::{MenuError, RegistryError};
use crate::expr::{self, Expr, Lookup};

#[derive(Clone)]
struct Slot {
    seq: u64,
    item: MenuItem,
    when: Option<Expr>,
    enablement: Option<Expr>,
}

impl Slot {
    fn sort_cmp(&self, other: &Slot) -> Ordering {
        let group = match (self.item.group(), other.item.group()) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        group
            .then_with(|| {
                let a = self.item.order().unwrap_or(0.0);
                let b = other.item.order().unwrap_or(0.0);
                a.total_cmp(&b)
            })
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct State {
    menus: IndexMap<String, Vec<Slot>>,
    next_seq: u64,
}

/// Items of every menu of one application.
pub struct MenuRegistry {
    state: Arc<RwLock<State>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl MenuRegistry {
    pub fn new(events: broadcast::Sender<RegistryEvent>) -> Self {
        Self { state: Arc::default(), events }
    }

    /// Append `items` to `menu_id`.
    ///
    /// Every clause is parsed before anything is inserted, so on error the
    /// registry is unchanged. The disposer removes exactly these items.
    pub fn append_menu_items<I>(&self, menu_id: &str, items: I) -> Result<Disposer, RegistryError>
    where
        I: IntoIterator<Item = MenuItem>,
    {
        if menu_id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        let mut parsed = Vec::new();
        for item in items {
            let owner = || format!("{}/{}", menu_id, item.label());
            let when = expr::parse_optional(item.when())
                .map_err(|source| RegistryError::InvalidExpression { owner: owner(), source })?;
            let enablement = match &item {
                MenuItem::Command(c) => c.command.enablement.as_deref(),
                MenuItem::Submenu(s) => s.enablement.as_deref(),
                MenuItem::Separator(_) => None,
            };
            let enablement = expr::parse_optional(enablement)
                .map_err(|source| RegistryError::InvalidExpression { owner: owner(), source })?;
            parsed.push((item, when, enablement));
        }

        let count = parsed.len();
        let seqs: BTreeSet<u64> = {
            let mut state = self.state.write();
            let mut seqs = BTreeSet::new();
            for (item, when, enablement) in parsed {
                state.next_seq += 1;
                let seq = state.next_seq;
                seqs.insert(seq);
                state
                    .menus
                    .entry(menu_id.to_string())
                    .or_default()
                    .push(Slot { seq, item, when, enablement });
            }
            seqs
        };
        tracing::debug!(menu = %menu_id, count, "appended menu items");
        self.emit(menu_id);

        let menu_id = menu_id.to_string();
        let weak: Weak<RwLock<State>> = Arc::downgrade(&self.state);
        let events = self.events.clone();
        Ok(Disposer::new(format!("menu:{}", menu_id), move || {
            let Some(state) = weak.upgrade() else {
                return Ok(());
            };
            let removed = {
                let mut state = state.write();
                let Some(slots) = state.menus.get_mut(&menu_id) else {
                    return Ok(());
                };
                let before = slots.len();
                slots.retain(|slot| !seqs.contains(&slot.seq));
                let removed = before - slots.len();
                if slots.is_empty() {
                    state.menus.shift_remove(&menu_id);
                }
                removed
            };
            if removed > 0 {
                tracing::debug!(menu = %menu_id, removed, "removed menu items");
                let _ = events.send(RegistryEvent::MenusChanged {
                    menu_ids: BTreeSet::from([menu_id]),
                });
            }
            Ok(())
        }))
    }

    /// Items of `menu_id` in display order. Empty for unknown menus.
    pub fn get_menu(&self, menu_id: &str) -> Vec<MenuItem> {
        self.sorted_slots(menu_id).into_iter().map(|slot| slot.item).collect()
    }

    /// Items of `menu_id` bucketed by group, in display order.
    ///
    /// Renderers draw a separator between consecutive buckets.
    pub fn iter_menu_groups(&self, menu_id: &str) -> Vec<(Option<String>, Vec<MenuItem>)> {
        let mut groups: Vec<(Option<String>, Vec<MenuItem>)> = Vec::new();
        for item in self.get_menu(menu_id) {
            let group = item.group().map(str::to_string);
            match groups.last_mut() {
                Some((last, items)) if *last == group => items.push(item),
                _ => groups.push((group, vec![item])),
            }
        }
        groups
    }

    /// Ids of menus with at least one item, in first-registration order.
    pub fn menu_ids(&self) -> Vec<String> {
        self.state.read().menus.keys().cloned().collect()
    }

    pub fn contains(&self, menu_id: &str) -> bool {
        self.state.read().menus.contains_key(menu_id)
    }

    /// Ids of every command placed in any menu.
    pub fn command_ids(&self) -> BTreeSet<String> {
        self.state
            .read()
            .menus
            .values()
            .flatten()
            .filter_map(|slot| slot.item.command_id().map(str::to_string))
            .collect()
    }

    /// Resolve `menu_id` into a renderable tree.
    ///
    /// Items whose `when` clause is false are dropped. Separators are placed
    /// between groups and collapsed so none lead, trail or repeat. When
    /// `commands` is given, command items take their enabled and checked
    /// state from it.
    pub fn resolve_menu(
        &self,
        menu_id: &str,
        ctx: &dyn Lookup,
        commands: Option<&CommandRegistry>,
    ) -> Result<Vec<MenuNode>, MenuError> {
        let mut path = Vec::new();
        self.resolve_into(menu_id, ctx, commands, &mut path)
    }

    /// Check that no submenu chain starting at `menu_id` loops back on itself,
    /// regardless of `when` clauses.
    pub fn validate(&self, menu_id: &str) -> Result<(), MenuError> {
        let mut path = Vec::new();
        self.walk_submenus(menu_id, &mut path)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn sorted_slots(&self, menu_id: &str) -> Vec<Slot> {
        let mut slots = self.state.read().menus.get(menu_id).cloned().unwrap_or_default();
        // Vec::sort_by is stable.
        slots.sort_by(Slot::sort_cmp);
        slots
    }

    fn enter(path: &mut Vec<String>, menu_id: &str) -> Result<(), MenuError> {
        if path.iter().any(|id| id == menu_id) {
            let mut cycle = path.clone();
            cycle.push(menu_id.to_string());
            return Err(MenuError::Cyclic { path: cycle });
        }
        path.push(menu_id.to_string());
        Ok(())
    }

    fn walk_submenus(&self, menu_id: &str, path: &mut Vec<String>) -> Result<(), MenuError> {
        Self::enter(path, menu_id)?;
        for slot in self.sorted_slots(menu_id) {
            if let MenuItem::Submenu(sub) = &slot.item {
                self.walk_submenus(&sub.submenu, path)?;
            }
        }
        path.pop();
        Ok(())
    }

    fn resolve_into(
        &self,
        menu_id: &str,
        ctx: &dyn Lookup,
        commands: Option<&CommandRegistry>,
        path: &mut Vec<String>,
    ) -> Result<Vec<MenuNode>, MenuError> {
        Self::enter(path, menu_id)?;

        let mut nodes: Vec<MenuNode> = Vec::new();
        let mut current_group: Option<Option<String>> = None;
        for slot in self.sorted_slots(menu_id) {
            if !expr::eval_optional(slot.when.as_ref(), ctx) {
                continue;
            }
            let group = slot.item.group().map(str::to_string);
            if current_group.as_ref().is_some_and(|g| *g != group) {
                push_separator(&mut nodes);
            }
            current_group = Some(group);

            match slot.item {
                MenuItem::Separator(_) => push_separator(&mut nodes),
                MenuItem::Command(item) => {
                    let id = item.command.id.as_str();
                    let (enabled, checked) = match commands {
                        Some(registry) if registry.contains(id) => {
                            (registry.is_enabled_in(id, ctx), registry.is_checked(id))
                        }
                        _ => (
                            expr::eval_optional(slot.enablement.as_ref(), ctx),
                            item.command.toggled.as_ref().map(|t| t.initially_checked),
                        ),
                    };
                    nodes.push(MenuNode::Command { item, enabled, checked });
                }
                MenuItem::Submenu(item) => {
                    let children = self.resolve_into(&item.submenu, ctx, commands, path)?;
                    let enabled = expr::eval_optional(slot.enablement.as_ref(), ctx);
                    nodes.push(MenuNode::Submenu { item, enabled, children });
                }
            }
        }
        if matches!(nodes.last(), Some(MenuNode::Separator)) {
            nodes.pop();
        }

        path.pop();
        Ok(nodes)
    }

    fn emit(&self, menu_id: &str) {
        let _ = self.events.send(RegistryEvent::MenusChanged {
            menu_ids: BTreeSet::from([menu_id.to_string()]),
        });
    }
}

fn push_separator(nodes: &mut Vec<MenuNode>) {
    if !matches!(nodes.last(), None | Some(MenuNode::Separator)) {
        nodes.push(MenuNode::Separator);
    }
}

impl std::fmt::Debug for MenuRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuRegistry").field("menus", &self.menu_ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmodel_api::{CommandRule, MenuRule, SeparatorItem, SubmenuItem};
    use std::collections::HashMap;

    fn registry() -> MenuRegistry {
        let (tx, _) = broadcast::channel(64);
        MenuRegistry::new(tx)
    }

    fn item(id: &str, rule: MenuRule) -> MenuItem {
        MenuItem::command(&CommandRule::new(id, id), &rule)
    }

    fn labels(items: &[MenuItem]) -> Vec<&str> {
        items.iter().map(MenuItem::label).collect()
    }

    #[test]
    fn test_group_then_order_then_insertion() {
        let menus = registry();
        let _d = menus
            .append_menu_items(
                "edit",
                [
                    item("Close", MenuRule::new("edit")),
                    item("Redo", MenuRule::new("edit").group("1_undo_redo").order(2.0)),
                    item("Undo", MenuRule::new("edit").group("1_undo_redo").order(1.0)),
                ],
            )
            .unwrap();
        assert_eq!(labels(&menus.get_menu("edit")), vec!["Undo", "Redo", "Close"]);
    }

    #[test]
    fn test_equal_keys_keep_registration_order() {
        let menus = registry();
        let _a = menus
            .append_menu_items("m", [item("first", MenuRule::new("m").group("g"))])
            .unwrap();
        let _b = menus
            .append_menu_items("m", [item("second", MenuRule::new("m").group("g"))])
            .unwrap();
        let _c = menus
            .append_menu_items("m", [item("zero", MenuRule::new("m").group("g").order(0.0))])
            .unwrap();
        assert_eq!(labels(&menus.get_menu("m")), vec!["first", "second", "zero"]);
    }

    #[test]
    fn test_groups_sort_lexically() {
        let menus = registry();
        let _d = menus
            .append_menu_items(
                "m",
                [
                    item("b", MenuRule::new("m").group("2_b")),
                    item("a", MenuRule::new("m").group("1_a")),
                    item("neg", MenuRule::new("m").group("2_b").order(-1.0)),
                ],
            )
            .unwrap();
        assert_eq!(labels(&menus.get_menu("m")), vec!["a", "neg", "b"]);
        let groups = menus.iter_menu_groups("m");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.as_deref(), Some("1_a"));
    }

    #[test]
    fn test_dispose_removes_only_its_items() {
        let menus = registry();
        let keep = menus.append_menu_items("m", [item("keep", MenuRule::new("m"))]).unwrap();
        let drop = menus.append_menu_items("m", [item("drop", MenuRule::new("m"))]).unwrap();
        drop.dispose().unwrap();
        assert_eq!(labels(&menus.get_menu("m")), vec!["keep"]);
        keep.dispose().unwrap();
        assert!(!menus.contains("m"));
        assert!(menus.menu_ids().is_empty());
    }

    #[test]
    fn test_invalid_when_leaves_registry_unchanged() {
        let menus = registry();
        let err = menus
            .append_menu_items(
                "m",
                [item("ok", MenuRule::new("m")), item("bad", MenuRule::new("m").when("(a"))],
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidExpression { .. }));
        assert!(menus.get_menu("m").is_empty());
    }

    #[test]
    fn test_resolve_filters_and_separates() {
        let menus = registry();
        let _d = menus
            .append_menu_items(
                "file",
                [
                    item("Open", MenuRule::new("file").group("1_open")),
                    item("Save", MenuRule::new("file").group("2_save").when("dirty")),
                    item("Close", MenuRule::new("file").group("3_close")),
                    MenuItem::Separator(SeparatorItem {
                        group: Some("3_close".into()),
                        order: Some(9.0),
                    }),
                ],
            )
            .unwrap();

        let ctx: HashMap<String, appmodel_api::Value> = HashMap::new();
        let nodes = menus.resolve_menu("file", &ctx, None).unwrap();
        let shown: Vec<_> = nodes.iter().map(MenuNode::label).collect();
        assert_eq!(shown, vec!["Open", "-", "Close"]);
    }

    #[test]
    fn test_resolve_nested_submenu() {
        let menus = registry();
        let _a = menus
            .append_menu_items("menubar", [MenuItem::from(SubmenuItem::new("file", "File"))])
            .unwrap();
        let _b = menus.append_menu_items("file", [item("Open", MenuRule::new("file"))]).unwrap();
        let nodes = menus.resolve_menu("menubar", &(), None).unwrap();
        match &nodes[0] {
            MenuNode::Submenu { children, enabled, .. } => {
                assert!(*enabled);
                assert_eq!(children[0].label(), "Open");
            }
            other => panic!("expected submenu, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_fails_fast() {
        let menus = registry();
        let _a = menus
            .append_menu_items("a", [MenuItem::from(SubmenuItem::new("b", "B"))])
            .unwrap();
        let _b = menus
            .append_menu_items("b", [MenuItem::from(SubmenuItem::new("a", "A"))])
            .unwrap();
        let err = menus.resolve_menu("a", &(), None).unwrap_err();
        assert_eq!(err, MenuError::Cyclic { path: vec!["a".into(), "b".into(), "a".into()] });
        assert!(menus.validate("a").is_err());
    }

    #[test]
    fn test_hidden_cycle_caught_by_validate() {
        let menus = registry();
        let _a = menus
            .append_menu_items("a", [MenuItem::from(SubmenuItem::new("a", "Self").when("never"))])
            .unwrap();
        assert!(menus.resolve_menu("a", &(), None).unwrap().is_empty());
        assert!(menus.validate("a").is_err());
    }

    #[test]
    fn test_append_emits_event() {
        let menus = registry();
        let mut rx = menus.subscribe();
        let _d = menus.append_menu_items("m", [item("x", MenuRule::new("m"))]).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            RegistryEvent::MenusChanged { menu_ids: BTreeSet::from(["m".to_string()]) }
        );
    }
}
