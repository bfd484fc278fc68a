//! Label selector evaluation
//!
//! Client-side pod selection used by the derivation stages. A nil or empty
//! selector matches every candidate; otherwise matchLabels and
//! matchExpressions are evaluated as a conjunction.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// True when the selector has no matchLabels and no matchExpressions
pub fn selector_is_empty(selector: &LabelSelector) -> bool {
    selector.match_labels.as_ref().is_none_or(|m| m.is_empty())
        && selector.match_expressions.as_ref().is_none_or(|e| e.is_empty())
}

fn matches_requirement(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let value = labels.get(&req.key);
    let values = req.values.as_deref().unwrap_or_default();
    match req.operator.as_str() {
        "In" => value.is_some_and(|v| values.iter().any(|w| w == v)),
        "NotIn" => value.is_none_or(|v| !values.iter().any(|w| w == v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

/// Evaluate a full LabelSelector against a label map
pub fn matches_selector(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    if let Some(match_labels) = &selector.match_labels {
        for (k, v) in match_labels {
            if labels.get(k) != Some(v) {
                return false;
            }
        }
    }
    if let Some(expressions) = &selector.match_expressions {
        for req in expressions {
            if !matches_requirement(req, labels) {
                return false;
            }
        }
    }
    true
}

/// Select pods matching `selector`; nil or empty selector selects all
pub fn select_pods<'a>(pods: &'a [Pod], selector: Option<&LabelSelector>) -> Vec<&'a Pod> {
    let Some(selector) = selector else {
        return pods.iter().collect();
    };
    if selector_is_empty(selector) {
        return pods.iter().collect();
    }
    static EMPTY: BTreeMap<String, String> = BTreeMap::new();
    pods.iter()
        .filter(|p| matches_selector(selector, p.metadata.labels.as_ref().unwrap_or(&EMPTY)))
        .collect()
}

/// Select pods by an exact label map (Service-style selector);
/// nil or empty map selects all
pub fn select_pods_by_labels<'a>(
    pods: &'a [Pod],
    labels: Option<&BTreeMap<String, String>>,
) -> Vec<&'a Pod> {
    let Some(want) = labels.filter(|m| !m.is_empty()) else {
        return pods.iter().collect();
    };
    pods.iter()
        .filter(|p| {
            let have = p.metadata.labels.as_ref();
            want.iter()
                .all(|(k, v)| have.is_some_and(|m| m.get(k) == Some(v)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: if labels.is_empty() {
                    None
                } else {
                    Some(
                        labels
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    )
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn names(pods: Vec<&Pod>) -> Vec<&str> {
        let mut out: Vec<&str> = pods
            .iter()
            .map(|p| p.metadata.name.as_deref().unwrap())
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_nil_selector_selects_all() {
        let pods = vec![pod("a", &[]), pod("b", &[("app", "web")])];
        assert_eq!(select_pods(&pods, None).len(), 2);
    }

    #[test]
    fn test_empty_selector_selects_all() {
        let pods = vec![pod("a", &[]), pod("b", &[("app", "web")])];
        let sel = LabelSelector::default();
        assert_eq!(select_pods(&pods, Some(&sel)).len(), 2);
    }

    #[test]
    fn test_match_labels_conjunction() {
        let pods = vec![
            pod("a", &[("app", "web"), ("tier", "front")]),
            pod("b", &[("app", "web")]),
            pod("c", &[("app", "db")]),
        ];
        let sel = LabelSelector {
            match_labels: Some(
                [("app", "web"), ("tier", "front")]
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        };
        assert_eq!(names(select_pods(&pods, Some(&sel))), vec!["a"]);
    }

    #[test]
    fn test_match_expressions() {
        let pods = vec![
            pod("a", &[("env", "prod")]),
            pod("b", &[("env", "dev")]),
            pod("c", &[]),
        ];

        let in_sel = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["prod".to_string(), "staging".to_string()]),
            }]),
            ..Default::default()
        };
        assert_eq!(names(select_pods(&pods, Some(&in_sel))), vec!["a"]);

        let not_in_sel = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "NotIn".to_string(),
                values: Some(vec!["prod".to_string()]),
            }]),
            ..Default::default()
        };
        // NotIn also matches pods without the key at all
        assert_eq!(names(select_pods(&pods, Some(&not_in_sel))), vec!["b", "c"]);

        let exists_sel = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "Exists".to_string(),
                values: None,
            }]),
            ..Default::default()
        };
        assert_eq!(names(select_pods(&pods, Some(&exists_sel))), vec!["a", "b"]);

        let absent_sel = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "DoesNotExist".to_string(),
                values: None,
            }]),
            ..Default::default()
        };
        assert_eq!(names(select_pods(&pods, Some(&absent_sel))), vec!["c"]);
    }

    #[test]
    fn test_select_by_label_map() {
        let pods = vec![pod("a", &[("app", "web")]), pod("b", &[("app", "db")])];
        let want: BTreeMap<String, String> = [("app".to_string(), "web".to_string())].into();
        assert_eq!(names(select_pods_by_labels(&pods, Some(&want))), vec!["a"]);
        assert_eq!(select_pods_by_labels(&pods, None).len(), 2);
        let empty = BTreeMap::new();
        assert_eq!(select_pods_by_labels(&pods, Some(&empty)).len(), 2);
    }
}
