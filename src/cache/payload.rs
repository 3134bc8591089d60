use serde_json::Value;

/// A validated drop from the subject palette.
///
/// The drag source hands over an untyped JSON blob carrying at least
/// `{ id: subjectId, teacherId }`. Anything without both, as positive integers
/// or numeric strings, is not a drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropPayload {
    pub subject_id: i64,
    pub teacher_id: i64,
    /// Display hints the palette may include; the cache uses the store's values.
    pub shorten: Option<String>,
    pub color: Option<String>,
}

impl DropPayload {
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |k: &str| {
            obj.get(k)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some(Self {
            subject_id: positive_id(obj.get("id")?)?,
            teacher_id: positive_id(obj.get("teacherId")?)?,
            shorten: text("shorten"),
            color: text("color"),
        })
    }
}

fn positive_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (id > 0).then_some(id)
}
