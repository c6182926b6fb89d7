//! Mapping between server session state and the local draft
//!
//! [`SessionStateCodec`] is pure: it translates step ids to linear indices
//! and draft fields to context entries, and compares the two sides field by
//! field. It never touches storage or the network.

use crate::context::{fields, is_blank, SessionContext};
use crate::draft::{LocalDraft, StepIndex};
use crate::ids::{QueryId, StepId};
use crate::session::WizardSession;
use crate::steps::StepLayout;
use serde_json::Value;
use std::collections::BTreeSet;

/// Pure session/draft translator
#[derive(Debug, Clone, Default)]
pub struct SessionStateCodec {
    layout: StepLayout,
}

impl SessionStateCodec {
    /// Codec over a specific step layout
    #[inline]
    #[must_use]
    pub fn new(layout: StepLayout) -> Self {
        Self { layout }
    }

    /// Step layout in use
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &StepLayout {
        &self.layout
    }

    /// Linear index of `step`, if the layout knows it
    #[inline]
    #[must_use]
    pub fn step_index(&self, step: &StepId) -> Option<StepIndex> {
        self.layout.index_of(step)
    }

    /// Linear index of `step`, falling back to the first step
    #[must_use]
    pub fn step_index_or_first(&self, step: &StepId) -> StepIndex {
        self.step_index(step).unwrap_or(StepIndex::FIRST)
    }

    /// Step id at `index`
    #[inline]
    #[must_use]
    pub fn step_id(&self, index: StepIndex) -> Option<&StepId> {
        self.layout.step_at(index)
    }

    /// Context entries carried by a draft; blank fields are omitted
    #[must_use]
    pub fn draft_to_context(&self, draft: &LocalDraft) -> SessionContext {
        let mut ctx = SessionContext::new();
        let mut put = |key: &str, value: Value| {
            if !is_blank(&value) {
                ctx.set(key, value);
            }
        };

        put(fields::ONDERWERP, Value::String(draft.onderwerp.clone()));
        put(fields::OVERHEIDSLAAG, opt_string(draft.overheidslaag.as_deref()));
        put(fields::SELECTED_ENTITY, opt_string(draft.selected_entity.as_deref()));
        put(fields::QUERY_ID, opt_string(draft.query_id.as_ref().map(QueryId::as_str)));
        put(fields::SELECTED_WEBSITES, string_list(&draft.selected_websites));
        ctx
    }

    /// Fresh draft populated from server state
    ///
    /// View-only state takes its defaults; the capture time is the server's
    /// last modification.
    #[must_use]
    pub fn draft_from_session(&self, session: &WizardSession) -> LocalDraft {
        let mut draft = LocalDraft::at_step(self.step_index_or_first(&session.current_step_id));
        self.overlay_context(&mut draft, &session.context);
        draft.timestamp = session.updated_at;
        draft
    }

    /// Overwrite the draft's semantic fields with every value present in `ctx`
    ///
    /// Fields absent from `ctx` are left untouched.
    pub fn overlay_context(&self, draft: &mut LocalDraft, ctx: &SessionContext) {
        if let Some(v) = ctx.str_field(fields::ONDERWERP) {
            draft.onderwerp = v.to_string();
        }
        if let Some(v) = ctx.str_field(fields::OVERHEIDSLAAG) {
            draft.overheidslaag = Some(v.to_string());
        }
        if let Some(v) = ctx.str_field(fields::SELECTED_ENTITY) {
            draft.selected_entity = Some(v.to_string());
        }
        if let Some(v) = ctx.str_field(fields::QUERY_ID) {
            draft.query_id = Some(QueryId::new(v));
        }
        if let Some(v) = ctx.list_field(fields::SELECTED_WEBSITES) {
            draft.selected_websites = v;
        }
    }

    /// Context fields whose server value differs from the draft
    ///
    /// Only well-known keys present (non-null) in `ctx` are considered;
    /// a field the server has never set cannot diverge. Website lists are
    /// compared as sets.
    #[must_use]
    pub fn divergent_fields(&self, draft: &LocalDraft, ctx: &SessionContext) -> BTreeSet<String> {
        let local = self.draft_to_context(draft);
        fields::ALL
            .iter()
            .filter_map(|key| ctx.get(key).map(|server| (*key, server)))
            .filter(|(key, server)| {
                let client = local.get(key);
                match client {
                    Some(client) => normalize(client) != normalize(server),
                    None => !is_blank(server),
                }
            })
            .map(|(key, _)| key.to_string())
            .collect()
    }
}

fn opt_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn string_list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => {
            let mut sorted: Vec<Value> = items.iter().map(normalize).collect();
            sorted.sort_by_key(Value::to_string);
            Value::Array(sorted)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SessionId;
    use crate::session::{Revision, SessionStatus};
    use crate::steps::WEBSITE_SELECTION;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn session_with(ctx: SessionContext, step: &str) -> WizardSession {
        WizardSession {
            session_id: SessionId::new("s-1"),
            wizard_definition_id: "beleidsscan-wizard".into(),
            wizard_definition_version: 1,
            current_step_id: StepId::from(step),
            revision: Revision(4),
            status: SessionStatus::Active,
            context: ctx,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn draft_to_context_skips_blank_fields() {
        let draft = LocalDraft {
            onderwerp: "fietsparkeren".into(),
            overheidslaag: Some("gemeente".into()),
            ..LocalDraft::default()
        };
        let ctx = SessionStateCodec::default().draft_to_context(&draft);

        let keys: Vec<&str> = ctx.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["onderwerp", "overheidslaag"]);
    }

    #[test]
    fn draft_from_session_maps_step_and_fields() {
        let mut ctx = SessionContext::new();
        ctx.set(fields::OVERHEIDSLAAG, "provincie");
        ctx.set(fields::SELECTED_WEBSITES, json!(["w1", "w2"]));
        let session = session_with(ctx, WEBSITE_SELECTION);

        let draft = SessionStateCodec::default().draft_from_session(&session);
        assert_eq!(draft.step, StepIndex(2));
        assert_eq!(draft.overheidslaag.as_deref(), Some("provincie"));
        assert_eq!(draft.onderwerp, "");
        assert_eq!(draft.selected_websites, vec!["w1", "w2"]);
        assert_eq!(draft.timestamp, session.updated_at);
    }

    #[test]
    fn unknown_step_falls_back_to_first() {
        let session = session_with(SessionContext::new(), "retired-step");
        let draft = SessionStateCodec::default().draft_from_session(&session);
        assert_eq!(draft.step, StepIndex::FIRST);
    }

    #[test]
    fn divergence_only_counts_server_fields() {
        let draft = LocalDraft {
            onderwerp: "fietsparkeren".into(),
            overheidslaag: Some("gemeente".into()),
            ..LocalDraft::default()
        };
        let mut ctx = SessionContext::new();
        ctx.set(fields::OVERHEIDSLAAG, "provincie");

        let divergent = SessionStateCodec::default().divergent_fields(&draft, &ctx);
        assert_eq!(divergent.into_iter().collect::<Vec<_>>(), vec!["overheidslaag"]);
    }

    #[test]
    fn website_lists_compare_as_sets() {
        let draft = LocalDraft {
            selected_websites: vec!["b".into(), "a".into()],
            ..LocalDraft::default()
        };
        let mut ctx = SessionContext::new();
        ctx.set(fields::SELECTED_WEBSITES, json!(["a", "b"]));

        assert!(SessionStateCodec::default()
            .divergent_fields(&draft, &ctx)
            .is_empty());
    }

    #[test]
    fn server_value_missing_locally_diverges() {
        let draft = LocalDraft::default();
        let mut ctx = SessionContext::new();
        ctx.set(fields::QUERY_ID, "q-1");

        let divergent = SessionStateCodec::default().divergent_fields(&draft, &ctx);
        assert!(divergent.contains(fields::QUERY_ID));
    }
}
