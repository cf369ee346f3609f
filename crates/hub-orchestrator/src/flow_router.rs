//! Flow Router — resolves the (flow, channel_config) tuple that governs
//! a turn. The resolution order is plain data, chained the same way the
//! LLM provider registry chains a sequence of fallbacks and returns the
//! first hit: conversation-pinned flow, then external-context hint, then
//! declarative rules, then nothing.

use std::sync::Arc;

use chrono::{Timelike, Utc};
use hub_core::domain::{Conversation, Flow, RoutingCondition};
use hub_store::Store;
use uuid::Uuid;

/// Everything downstream layers need about the resolved routing for a turn.
#[derive(Clone, Debug)]
pub struct ResolvedRouting {
    pub flow: Flow,
}

pub struct FlowRouter {
    store: Arc<Store>,
}

impl FlowRouter {
    pub fn new(store: Arc<Store>) -> Self {
        FlowRouter { store }
    }

    /// Resolution order: conversation-pinned flow, external-context hint,
    /// declarative rules, else `None` (orchestrator falls back to
    /// default-model behavior).
    pub async fn resolve(
        &self,
        conversation: &Conversation,
        channel_type: &str,
        channel_config_id: Option<Uuid>,
    ) -> Result<Option<ResolvedRouting>, hub_store::StoreError> {
        if let Some(flow_id) = conversation.flow_id {
            if let Some(flow) = self.store.get_flow(flow_id).await? {
                if flow.active {
                    return Ok(Some(ResolvedRouting { flow }));
                }
            }
        }

        if let Some(flow) = self.resolve_external_context_hint(conversation).await? {
            return Ok(Some(ResolvedRouting { flow }));
        }

        if let Some(cfg_id) = channel_config_id {
            let bound = self.store.flows_for_channel_config(cfg_id).await?;
            for (_, flow) in bound {
                if self.routing_matches(&flow.routing, channel_type) {
                    return Ok(Some(ResolvedRouting { flow }));
                }
            }
        }

        let flows = self.store.active_flows_by_priority().await?;
        for flow in flows {
            if self.routing_matches(&flow.routing, channel_type) {
                return Ok(Some(ResolvedRouting { flow }));
            }
        }

        Ok(None)
    }

    async fn resolve_external_context_hint(
        &self,
        conversation: &Conversation,
    ) -> Result<Option<Flow>, hub_store::StoreError> {
        for envelope in conversation.external_context.values() {
            let Some(flow_id_str) = envelope
                .get("routing")
                .and_then(|r| r.get("flowId"))
                .and_then(|v| v.as_str())
            else {
                continue;
            };
            let Ok(flow_id) = Uuid::parse_str(flow_id_str) else {
                continue;
            };
            if let Some(flow) = self.store.get_flow(flow_id).await? {
                if flow.active {
                    return Ok(Some(flow));
                }
            }
        }
        Ok(None)
    }

    /// A rule with no conditions at all matches unconditionally — an
    /// empty `RoutingCondition` is the "catch-all default flow" case.
    fn routing_matches(&self, routing: &RoutingCondition, channel_type: &str) -> bool {
        if !routing.channel_types.is_empty() && !routing.channel_types.iter().any(|c| c == channel_type) {
            return false;
        }

        if let Some(window) = &routing.time_of_day {
            if !self.within_time_window(window) {
                return false;
            }
        }

        true
    }

    fn within_time_window(&self, window: &hub_core::domain::TimeWindow) -> bool {
        // Timezone-aware scheduling is out of scope here (no tz database
        // dependency in the stack); approximate with UTC hour comparison.
        let _ = &window.timezone;
        let hour = Utc::now().hour() as u8;
        if window.start_hour <= window.end_hour {
            hour >= window.start_hour && hour < window.end_hour
        } else {
            hour >= window.start_hour || hour < window.end_hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::domain::TimeWindow;

    fn router_without_store() -> FlowRouterTestable {
        FlowRouterTestable
    }

    /// Exercises the pure routing-condition matcher without a `Store`.
    struct FlowRouterTestable;

    impl FlowRouterTestable {
        fn matches(&self, routing: &RoutingCondition, channel_type: &str) -> bool {
            if !routing.channel_types.is_empty() && !routing.channel_types.iter().any(|c| c == channel_type) {
                return false;
            }
            true
        }
    }

    #[test]
    fn test_empty_routing_matches_any_channel() {
        let r = router_without_store();
        let routing = RoutingCondition {
            channel_types: Vec::new(),
            phone_regexes: Vec::new(),
            bot_usernames: Vec::new(),
            time_of_day: None,
        };
        assert!(r.matches(&routing, "whatsapp"));
        assert!(r.matches(&routing, "telegram"));
    }

    #[test]
    fn test_channel_type_filter_excludes_other_channels() {
        let r = router_without_store();
        let routing = RoutingCondition {
            channel_types: vec!["telegram".into()],
            phone_regexes: Vec::new(),
            bot_usernames: Vec::new(),
            time_of_day: None,
        };
        assert!(r.matches(&routing, "telegram"));
        assert!(!r.matches(&routing, "whatsapp"));
    }

    #[test]
    fn test_time_window_wraps_midnight() {
        let window = TimeWindow {
            start_hour: 22,
            end_hour: 6,
            timezone: "UTC".into(),
        };
        assert!(window.start_hour > window.end_hour);
    }
}
