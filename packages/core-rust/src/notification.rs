//! Notification addressing.
//!
//! Every notification is addressed by a two-level key: the operation type and
//! the instance id (empty for the global instance), plus the event kind.
//! Subscribers pick a [`Scope`]: a type scope sees every instance of the type,
//! an instance scope sees only that instance. One publish therefore reaches
//! both kinds of subscriber exactly once, and the publisher never duplicates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::extras::Extras;

/// Instance id of the global (unnamed) instance of an operation type.
pub const GLOBAL_INSTANCE: &str = "";

/// Lifecycle event published by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Dispatch began (or a duplicate `perform` hit an executing operation).
    Start,
    /// Terminal success.
    Ok,
    /// Terminal failure.
    Error,
    /// Follows every `Ok`/`Error`.
    Finish,
    /// Dispatch was refused before any strategy ran.
    NoConnectivity,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        Self::Start,
        Self::Ok,
        Self::Error,
        Self::Finish,
        Self::NoConnectivity,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Finish => "FINISH",
            Self::NoConnectivity => "NO_CONNECTIVITY",
        }
    }

    /// Whether this event carries the terminal verdict.
    #[must_use]
    pub fn is_verdict(self) -> bool {
        matches!(self, Self::Ok | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite address of one emission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationAddress {
    pub operation_type: String,
    /// Empty for the global instance.
    pub instance_id: String,
    pub event: EventKind,
}

impl NotificationAddress {
    #[must_use]
    pub fn new(
        operation_type: impl Into<String>,
        instance_id: impl Into<String>,
        event: EventKind,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            instance_id: instance_id.into(),
            event,
        }
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.instance_id.is_empty()
    }
}

impl fmt::Display for NotificationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "{}/{}", self.operation_type, self.event)
        } else {
            write!(f, "{}#{}/{}", self.operation_type, self.instance_id, self.event)
        }
    }
}

/// Which addresses a subscriber is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Every instance of an operation type, the global one included.
    Type { operation_type: String },
    /// One named instance of an operation type.
    Instance {
        operation_type: String,
        instance_id: String,
    },
}

impl Scope {
    #[must_use]
    pub fn for_type(operation_type: impl Into<String>) -> Self {
        Self::Type {
            operation_type: operation_type.into(),
        }
    }

    /// Scope for one instance. An empty id names the global instance, whose
    /// address coincides with the type address, so it yields a type scope.
    #[must_use]
    pub fn for_instance(operation_type: impl Into<String>, instance_id: impl Into<String>) -> Self {
        let instance_id = instance_id.into();
        if instance_id.is_empty() {
            Self::for_type(operation_type)
        } else {
            Self::Instance {
                operation_type: operation_type.into(),
                instance_id,
            }
        }
    }

    #[must_use]
    pub fn operation_type(&self) -> &str {
        match self {
            Self::Type { operation_type } | Self::Instance { operation_type, .. } => operation_type,
        }
    }

    #[must_use]
    pub fn matches(&self, address: &NotificationAddress) -> bool {
        match self {
            Self::Type { operation_type } => address.operation_type == *operation_type,
            Self::Instance {
                operation_type,
                instance_id,
            } => address.operation_type == *operation_type && address.instance_id == *instance_id,
        }
    }
}

/// One delivered lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub address: NotificationAddress,
    /// Position in the channel's total publish order.
    pub sequence: u64,
    pub extras: Extras,
}

impl Notification {
    #[must_use]
    pub fn event(&self) -> EventKind {
        self.address.event
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn addr(ty: &str, id: &str) -> NotificationAddress {
        NotificationAddress::new(ty, id, EventKind::Start)
    }

    #[test]
    fn type_scope_sees_every_instance() {
        let scope = Scope::for_type("CreateDevice");
        assert!(scope.matches(&addr("CreateDevice", "")));
        assert!(scope.matches(&addr("CreateDevice", "a")));
        assert!(!scope.matches(&addr("DeleteDevice", "")));
    }

    #[test]
    fn instance_scope_sees_only_its_instance() {
        let scope = Scope::for_instance("CreateDevice", "a");
        assert!(scope.matches(&addr("CreateDevice", "a")));
        assert!(!scope.matches(&addr("CreateDevice", "b")));
        assert!(!scope.matches(&addr("CreateDevice", "")));
    }

    #[test]
    fn empty_instance_scope_is_type_scope() {
        assert_eq!(
            Scope::for_instance("CreateDevice", GLOBAL_INSTANCE),
            Scope::for_type("CreateDevice")
        );
    }

    #[test]
    fn address_display() {
        assert_eq!(addr("Op", "").to_string(), "Op/START");
        assert_eq!(
            NotificationAddress::new("Op", "7", EventKind::NoConnectivity).to_string(),
            "Op#7/NO_CONNECTIVITY"
        );
    }

    #[test]
    fn event_kind_wire_names() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    proptest! {
        // The type-scoped subscriber and the matching instance-scoped
        // subscriber both see an emission; nobody sees it twice because a
        // scope is a predicate over a single delivery.
        #[test]
        fn one_emission_reaches_both_scopes(
            ty in "[A-Za-z]{1,8}",
            id in "[a-z0-9]{0,4}",
            other in "[a-z0-9]{1,4}",
        ) {
            let address = addr(&ty, &id);
            prop_assert!(Scope::for_type(ty.clone()).matches(&address));
            prop_assert!(Scope::for_instance(ty.clone(), id.clone()).matches(&address));
            if other != id && !id.is_empty() {
                prop_assert!(!Scope::for_instance(ty.clone(), other).matches(&address));
            }
        }
    }
}
