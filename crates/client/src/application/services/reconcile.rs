//! Classifying a server verdict against the local prediction.

use serde_json::{json, Map, Number, Value};

use racketeer_shared::SubmitActionResponse;

/// How a submitted action ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Rejected {
        reason: String,
        result: Option<Value>,
    },
    Synced {
        result: Option<Value>,
    },
    Adjusted {
        result: Value,
        adjustments: Value,
    },
}

/// Decide the verdict for one response.
///
/// The server's `adjusted` flag wins when present. Without it, the results
/// are compared structurally; a response with no result is a clean match.
pub fn classify(local: &Value, response: SubmitActionResponse) -> Verdict {
    let result = Some(response.result).filter(|r| !r.is_null());

    if response.rejected {
        return Verdict::Rejected {
            reason: response
                .reason
                .unwrap_or_else(|| "rejected by server".to_string()),
            result,
        };
    }

    let Some(result) = result else {
        if response.adjusted == Some(true) {
            return Verdict::Adjusted {
                adjustments: response.adjustments.unwrap_or(Value::Null),
                result: Value::Null,
            };
        }
        return Verdict::Synced { result: None };
    };

    let adjusted = response
        .adjusted
        .unwrap_or_else(|| !values_match(local, &result));

    if adjusted {
        let adjustments = response
            .adjustments
            .unwrap_or_else(|| diff_results(local, &result));
        Verdict::Adjusted {
            result,
            adjustments,
        }
    } else {
        Verdict::Synced {
            result: Some(result),
        }
    }
}

/// Structural equality where `100` and `100.0` are the same number.
pub fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_match(v, w)))
        }
        _ => a == b,
    }
}

/// Per-field difference of two result objects.
///
/// Numeric fields produce `{local, server, delta}`; any other changed field
/// produces `{local, server}`. Non-object results are reported whole.
pub fn diff_results(local: &Value, server: &Value) -> Value {
    let (Value::Object(local_fields), Value::Object(server_fields)) = (local, server) else {
        return json!({ "local": local, "server": server });
    };

    let mut diff = Map::new();
    let keys = server_fields
        .keys()
        .chain(local_fields.keys().filter(|k| !server_fields.contains_key(*k)));

    for key in keys {
        let l = local_fields.get(key).unwrap_or(&Value::Null);
        let s = server_fields.get(key).unwrap_or(&Value::Null);
        if values_match(l, s) {
            continue;
        }
        let entry = match (l, s) {
            (Value::Number(ln), Value::Number(sn)) => {
                json!({ "local": l, "server": s, "delta": delta(ln, sn) })
            }
            _ => json!({ "local": l, "server": s }),
        };
        diff.insert(key.clone(), entry);
    }

    Value::Object(diff)
}

fn delta(local: &Number, server: &Number) -> Value {
    if let (Some(l), Some(s)) = (local.as_i64(), server.as_i64()) {
        if let Some(d) = s.checked_sub(l) {
            return Value::from(d);
        }
    }
    let d = server.as_f64().unwrap_or(0.0) - local.as_f64().unwrap_or(0.0);
    Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(result: Value) -> SubmitActionResponse {
        SubmitActionResponse {
            result,
            ..SubmitActionResponse::default()
        }
    }

    #[test]
    fn test_rejection_wins_over_everything() {
        let verdict = classify(
            &json!({"cash": 100}),
            SubmitActionResponse {
                rejected: true,
                reason: Some("crime on cooldown".into()),
                adjusted: Some(true),
                ..SubmitActionResponse::default()
            },
        );
        assert_eq!(
            verdict,
            Verdict::Rejected {
                reason: "crime on cooldown".into(),
                result: None
            }
        );
    }

    #[test]
    fn test_matching_result_is_synced() {
        let verdict = classify(
            &json!({"cash": 100, "heat": 2}),
            response(json!({"heat": 2.0, "cash": 100})),
        );
        assert_eq!(
            verdict,
            Verdict::Synced {
                result: Some(json!({"heat": 2.0, "cash": 100}))
            }
        );
    }

    #[test]
    fn test_differing_result_is_adjusted_with_computed_diff() {
        let verdict = classify(
            &json!({"cash": 150, "item": "watch"}),
            response(json!({"cash": 100, "item": "watch"})),
        );
        assert_eq!(
            verdict,
            Verdict::Adjusted {
                result: json!({"cash": 100, "item": "watch"}),
                adjustments: json!({"cash": {"local": 150, "server": 100, "delta": -50}}),
            }
        );
    }

    #[test]
    fn test_server_flag_overrides_comparison() {
        let flagged_clean = classify(
            &json!({"cash": 150}),
            SubmitActionResponse {
                result: json!({"cash": 100}),
                adjusted: Some(false),
                ..SubmitActionResponse::default()
            },
        );
        assert!(matches!(flagged_clean, Verdict::Synced { .. }));

        let flagged_adjusted = classify(
            &json!({"cash": 100}),
            SubmitActionResponse {
                result: json!({"cash": 100}),
                adjusted: Some(true),
                adjustments: Some(json!({"bonus": "event multiplier"})),
                ..SubmitActionResponse::default()
            },
        );
        assert_eq!(
            flagged_adjusted,
            Verdict::Adjusted {
                result: json!({"cash": 100}),
                adjustments: json!({"bonus": "event multiplier"}),
            }
        );
    }

    #[test]
    fn test_missing_result_is_clean() {
        assert_eq!(
            classify(&json!({"cash": 1}), SubmitActionResponse::default()),
            Verdict::Synced { result: None }
        );
    }

    #[test]
    fn test_diff_covers_added_removed_and_float_fields() {
        let diff = diff_results(
            &json!({"cash": 10, "xp": 1.5, "loot": "ring"}),
            &json!({"cash": 10, "xp": 2.0, "heat": 3}),
        );
        assert_eq!(
            diff,
            json!({
                "xp": {"local": 1.5, "server": 2.0, "delta": 0.5},
                "heat": {"local": null, "server": 3},
                "loot": {"local": "ring", "server": null}
            })
        );
    }

    #[test]
    fn test_diff_of_scalars_reports_both_sides() {
        assert_eq!(
            diff_results(&json!(5), &json!("five")),
            json!({"local": 5, "server": "five"})
        );
    }
}
