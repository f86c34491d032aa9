//! Domain DTOs for the CrossEngage API.
//!
//! # Design
//! The API accepts free-form user documents: a handful of well-known fields
//! plus any number of custom traits. `User` names the well-known ones and
//! flattens the rest into `traits`, so callers get typed access without
//! losing fields the crate does not know about. Request-only payload shapes
//! are crate-private and defined here too, so all wire names sit in one
//! place.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// A user document as sent to (and returned by) the users endpoints.
///
/// Trait keys that collide with a named field are never sent: the named
/// field is the only source for `id`, `email` and the rest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// External id, the key used by most user endpoints.
    pub id: Option<String>,
    pub email: Option<String>,
    pub business_unit: Option<String>,
    /// Identifier assigned by CrossEngage.
    pub xng_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birthday: Option<String>,
    pub created_at: Option<String>,
    pub gender: Option<String>,
    /// Any other top-level attribute.
    #[serde(flatten)]
    pub traits: Map<String, Value>,
}

/// Wire names of the named `User` fields.
const USER_FIELDS: [&str; 9] = [
    "id",
    "email",
    "businessUnit",
    "xngId",
    "firstName",
    "lastName",
    "birthday",
    "createdAt",
    "gender",
];

impl User {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_xng_id(xng_id: impl Into<String>) -> Self {
        Self {
            xng_id: Some(xng_id.into()),
            ..Self::default()
        }
    }

    /// Set an attribute, returning `self` for chaining. Names of named
    /// fields (`"id"`, `"xngId"`, ...) set that field instead of a trait.
    pub fn trait_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.field_mut(&name) {
            Some(field) => {
                *field = match value {
                    Value::Null => None,
                    Value::String(text) => Some(text),
                    other => Some(other.to_string()),
                }
            }
            None => {
                self.traits.insert(name, value);
            }
        }
        self
    }

    fn field_mut(&mut self, wire_name: &str) -> Option<&mut Option<String>> {
        let field = match wire_name {
            "id" => &mut self.id,
            "email" => &mut self.email,
            "businessUnit" => &mut self.business_unit,
            "xngId" => &mut self.xng_id,
            "firstName" => &mut self.first_name,
            "lastName" => &mut self.last_name,
            "birthday" => &mut self.birthday,
            "createdAt" => &mut self.created_at,
            "gender" => &mut self.gender,
            _ => return None,
        };
        Some(field)
    }

    fn fields(&self) -> [&Option<String>; 9] {
        [
            &self.id,
            &self.email,
            &self.business_unit,
            &self.xng_id,
            &self.first_name,
            &self.last_name,
            &self.birthday,
            &self.created_at,
            &self.gender,
        ]
    }
}

impl Serialize for User {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in USER_FIELDS.iter().zip(self.fields()) {
            if let Some(value) = value {
                map.serialize_entry(name, value)?;
            }
        }
        for (name, value) in &self.traits {
            if !USER_FIELDS.contains(&name.as_str()) {
                map.serialize_entry(name, value)?;
            }
        }
        map.end()
    }
}

/// Data type of a user attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    String,
    Datetime,
    Float,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Communication channel a user can be opted out of (or back into).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Mail,
    BrowserNotification,
    OnsiteDisplay,
    ExitIntent,
    PushNotification,
    DirectMail,
    Sms,
}

impl Channel {
    /// Wire name, as used in the `channelType` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Mail => "MAIL",
            Channel::BrowserNotification => "BROWSER_NOTIFICATION",
            Channel::OnsiteDisplay => "ONSITE_DISPLAY",
            Channel::ExitIntent => "EXIT_INTENT",
            Channel::PushNotification => "PUSH_NOTIFICATION",
            Channel::DirectMail => "DIRECT_MAIL",
            Channel::Sms => "SMS",
        }
    }
}

/// Who a batch of events belongs to. At least one of `email` and `user_id`
/// must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecipient {
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub business_unit: Option<String>,
}

impl EventRecipient {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn in_business_unit(mut self, business_unit: impl Into<String>) -> Self {
        self.business_unit = Some(business_unit.into());
        self
    }
}

/// Prefix the API expects on custom top-level attribute names.
pub(crate) const TRAITS_PREFIX: &str = "traits.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewAttribute<'a> {
    pub name: String,
    pub attribute_type: AttributeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested_type: Option<AttributeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchPayload<'a> {
    pub updated: &'a [User],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<&'a [User]>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsPayload<'a> {
    pub events: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_unit: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OptOutPayload {
    pub opt_out: bool,
}
