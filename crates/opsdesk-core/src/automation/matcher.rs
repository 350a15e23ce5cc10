//! Event-bound rule matching

use opsdesk_storage::models::AutomationRule;
use serde_json::Value;

/// Whether an event-bound rule matches an event.
///
/// The rule must be active, its trigger event must equal the event type,
/// and every key in `trigger_filters` must equal the corresponding payload
/// value (shallow equality; a key absent from the payload never matches).
pub fn rule_matches(rule: &AutomationRule, event_type: &str, payload: &Value) -> bool {
    if !rule.is_active() || rule.kind != "event" {
        return false;
    }
    if rule.trigger_event.as_deref() != Some(event_type) {
        return false;
    }
    filters_match(&rule.trigger_filters, payload)
}

fn filters_match(filters: &Value, payload: &Value) -> bool {
    match filters.as_object() {
        Some(map) => map.iter().all(|(key, want)| payload.get(key) == Some(want)),
        // A null/malformed filter blob never constrains
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn rule(event: &str, filters: Value, status: &str) -> AutomationRule {
        AutomationRule {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            kind: "event".to_string(),
            cadence: None,
            cron_expression: None,
            scheduled_time: None,
            run_once: false,
            trigger_event: Some(event.to_string()),
            trigger_filters: filters,
            action_module: "webhook".to_string(),
            action_payload: json!({}),
            status: status.to_string(),
            next_run_at: None,
            last_run_at: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_matches_event_type_and_filters() {
        let r = rule("ticket.updated", json!({"status": "closed"}), "active");
        assert!(rule_matches(
            &r,
            "ticket.updated",
            &json!({"status": "closed", "priority": "high"})
        ));
        assert!(!rule_matches(&r, "ticket.created", &json!({"status": "closed"})));
        assert!(!rule_matches(&r, "ticket.updated", &json!({"status": "open"})));
    }

    #[test]
    fn test_absent_payload_key_never_matches() {
        let r = rule("ticket.updated", json!({"status": "closed"}), "active");
        assert!(!rule_matches(&r, "ticket.updated", &json!({"priority": "high"})));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let r = rule("ticket.created", json!({}), "active");
        assert!(rule_matches(&r, "ticket.created", &json!({"anything": 1})));
    }

    #[test]
    fn test_inactive_rule_never_matches() {
        let r = rule("ticket.created", json!({}), "inactive");
        assert!(!rule_matches(&r, "ticket.created", &json!({})));
    }

    #[test]
    fn test_filter_values_compare_strictly() {
        // "1" (string) is not 1 (number)
        let r = rule("ticket.created", json!({"priority": 1}), "active");
        assert!(!rule_matches(&r, "ticket.created", &json!({"priority": "1"})));
        assert!(rule_matches(&r, "ticket.created", &json!({"priority": 1})));
    }
}
