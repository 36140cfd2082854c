use crate::model::{Item, ItemInput, ValidItem};

/// What submitting the shared item form resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemAction {
    /// The guard rejected the input; nothing is written
    Rejected,
    Create(ValidItem),
    Update { item_id: String, item: ValidItem },
}

/// UI state of one section: expanded or collapsed, and which item (if any)
/// the item form is currently editing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionState {
    expanded: bool,
    editing_item_id: Option<String>,
}

impl SectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_editing(expanded: bool, editing_item_id: Option<String>) -> Self {
        SectionState {
            expanded,
            editing_item_id: editing_item_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
    }

    pub fn editing_item_id(&self) -> Option<&str> {
        self.editing_item_id.as_deref()
    }

    /// Select `item` for editing and return the values to pre-fill the form with.
    pub fn begin_edit(&mut self, item: &Item) -> ItemInput {
        self.editing_item_id = Some(item.id.clone());
        ItemInput::from_item(item)
    }

    pub fn cancel_edit(&mut self) {
        self.editing_item_id = None;
    }

    pub fn plan_submit(&self, input: &ItemInput) -> ItemAction {
        let Some(item) = input.validate() else {
            return ItemAction::Rejected;
        };
        match &self.editing_item_id {
            Some(item_id) => ItemAction::Update {
                item_id: item_id.clone(),
                item,
            },
            None => ItemAction::Create(item),
        }
    }

    /// Record that `action` was carried out. An update ends the edit.
    pub fn finish_submit(&mut self, action: &ItemAction) {
        if matches!(action, ItemAction::Update { .. }) {
            self.editing_item_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lumber() -> Item {
        Item {
            id: "i1".to_string(),
            name: "Lumber".to_string(),
            amount: Some(500.0),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn toggles_expanded() {
        let mut state = SectionState::new();
        assert!(!state.is_expanded());
        state.toggle();
        assert!(state.is_expanded());
        state.toggle();
        assert!(!state.is_expanded());
    }

    #[test]
    fn edit_then_submit_updates_and_clears() {
        let mut state = SectionState::new();
        let mut input = state.begin_edit(&lumber());
        assert_eq!(state.editing_item_id(), Some("i1"));
        assert_eq!(input.amount, Some(500.0));

        input.amount = Some(600.0);
        let action = state.plan_submit(&input);
        assert_eq!(
            action,
            ItemAction::Update {
                item_id: "i1".to_string(),
                item: ValidItem {
                    name: "Lumber".to_string(),
                    amount: 600.0
                }
            }
        );
        state.finish_submit(&action);
        assert_eq!(state.editing_item_id(), None);
    }

    #[test]
    fn rejected_submit_keeps_selection() {
        let mut state = SectionState::new();
        let mut input = state.begin_edit(&lumber());
        input.amount = Some(0.0);

        let action = state.plan_submit(&input);
        assert_eq!(action, ItemAction::Rejected);
        state.finish_submit(&action);
        assert_eq!(state.editing_item_id(), Some("i1"));
    }

    #[test]
    fn without_selection_creates() {
        let state = SectionState::with_editing(true, Some(String::new()));
        assert!(matches!(
            state.plan_submit(&ItemInput::new("Paint", 75.0)),
            ItemAction::Create(_)
        ));
    }
}
