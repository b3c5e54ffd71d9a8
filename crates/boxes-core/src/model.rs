use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::ValidationError;
use crate::ids::{BoxId, UserId};
use crate::time::format_timestamp;

/// The authenticated user performing a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub username: String,
    pub is_staff: bool,
}

/// Owner reference embedded in a box record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Owner {
    pub id: UserId,
    pub username: String,
}

/// A stored box. `area` and `volume` are derived on read, never stored.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxRecord {
    pub id: BoxId,
    pub owner: Owner,
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BoxRecord {
    pub fn area(&self) -> f64 {
        self.length * self.breadth
    }

    pub fn volume(&self) -> f64 {
        self.length * self.breadth * self.height
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner.id == user
    }
}

impl Serialize for BoxRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BoxRecord", 9)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("owner", &self.owner)?;
        s.serialize_field("length", &self.length)?;
        s.serialize_field("breadth", &self.breadth)?;
        s.serialize_field("height", &self.height)?;
        s.serialize_field("area", &self.area())?;
        s.serialize_field("volume", &self.volume())?;
        s.serialize_field("createdAt", &format_timestamp(self.created_at))?;
        s.serialize_field("updatedAt", &format_timestamp(self.updated_at))?;
        s.end()
    }
}

/// Dimensions for a box about to be created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewBox {
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
}

impl NewBox {
    /// Parse a create payload. All three dimensions are required; any other
    /// key (including `owner` and `createdAt`) is ignored.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let obj = as_object(body)?;
        let mut missing = Vec::new();
        let mut dims = [0.0_f64; 3];
        for (slot, field) in dims.iter_mut().zip(DIMENSIONS) {
            match dimension(obj, field)? {
                Some(v) => *slot = v,
                None => missing.push(field),
            }
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(
                missing.iter().map(|f| (*f).to_string()).collect(),
            ));
        }
        let [length, breadth, height] = dims;
        Ok(Self {
            length,
            breadth,
            height,
        })
    }
}

/// A partial update. Ownership and creation time are not representable here,
/// so they cannot leak into an update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxPatch {
    pub length: Option<f64>,
    pub breadth: Option<f64>,
    pub height: Option<f64>,
}

impl BoxPatch {
    /// Parse an update payload. Keys other than the three dimensions are
    /// silently dropped.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let obj = as_object(body)?;
        Ok(Self {
            length: dimension(obj, "length")?,
            breadth: dimension(obj, "breadth")?,
            height: dimension(obj, "height")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.length.is_none() && self.breadth.is_none() && self.height.is_none()
    }

    pub fn apply(&self, record: &mut BoxRecord) {
        if let Some(v) = self.length {
            record.length = v;
        }
        if let Some(v) = self.breadth {
            record.breadth = v;
        }
        if let Some(v) = self.height {
            record.height = v;
        }
    }
}

const DIMENSIONS: [&str; 3] = ["length", "breadth", "height"];

fn as_object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object().ok_or(ValidationError::NotAnObject)
}

/// Read one dimension. Numbers and numeric strings are accepted; `null` counts
/// as absent.
fn dimension(obj: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ValidationError> {
    let value = match obj.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(ValidationError::InvalidNumber { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(length: f64, breadth: f64, height: f64) -> BoxRecord {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        BoxRecord {
            id: BoxId::from_raw(1),
            owner: Owner {
                id: UserId::from_raw(3),
                username: "alice".into(),
            },
            length,
            breadth,
            height,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn derived_area_and_volume() {
        let r = record(10.0, 10.0, 2.0);
        assert_eq!(r.area(), 100.0);
        assert_eq!(r.volume(), 200.0);
    }

    #[test]
    fn serializes_derived_fields_in_camel_case() {
        let value = serde_json::to_value(record(2.0, 3.0, 4.0)).unwrap();
        assert_eq!(value["area"], 6.0);
        assert_eq!(value["volume"], 24.0);
        assert_eq!(value["owner"]["username"], "alice");
        assert_eq!(value["createdAt"], "2024-05-01T10:00:00.000000Z");
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn new_box_requires_all_dimensions() {
        let err = NewBox::from_json(&json!({"length": 1.0})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields(vec!["breadth".into(), "height".into()])
        );
    }

    #[test]
    fn new_box_ignores_owner_and_created_at() {
        let parsed = NewBox::from_json(&json!({
            "length": 1, "breadth": "2.5", "height": 3.0,
            "owner": 99, "createdAt": "2000-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            parsed,
            NewBox {
                length: 1.0,
                breadth: 2.5,
                height: 3.0
            }
        );
    }

    #[test]
    fn non_numeric_dimension_is_rejected() {
        let err = NewBox::from_json(&json!({"length": "wide", "breadth": 1, "height": 1})).unwrap_err();
        assert_eq!(err, ValidationError::InvalidNumber { field: "length" });
        let err = BoxPatch::from_json(&json!({"height": [1]})).unwrap_err();
        assert_eq!(err, ValidationError::InvalidNumber { field: "height" });
    }

    #[test]
    fn body_must_be_an_object() {
        assert_eq!(
            BoxPatch::from_json(&json!([1, 2])).unwrap_err(),
            ValidationError::NotAnObject
        );
    }

    #[test]
    fn patch_drops_protected_fields_and_applies_the_rest() {
        let patch = BoxPatch::from_json(&json!({
            "height": 7.0,
            "owner": {"id": 99},
            "user": 99,
            "createdAt": "1999-01-01T00:00:00Z",
            "created_at": "1999-01-01T00:00:00Z"
        }))
        .unwrap();
        let mut r = record(1.0, 2.0, 3.0);
        let before = r.clone();
        patch.apply(&mut r);
        assert_eq!(r.height, 7.0);
        assert_eq!(r.length, 1.0);
        assert_eq!(r.owner, before.owner);
        assert_eq!(r.created_at, before.created_at);
    }

    #[test]
    fn empty_patch() {
        assert!(BoxPatch::from_json(&json!({"owner": 1})).unwrap().is_empty());
    }
}
