//! Error types shared across the store.

use thiserror::Error;

/// Errors surfaced by store operations.
///
/// All validation errors are synchronous at the API boundary: `dispatch`
/// rejects unregistered events before they reach the queue, registration
/// rejects malformed interceptors, and `subscribe`/`query` reject unknown
/// subscription ids at the call site. A handler error during a batch purges
/// the remaining batch and propagates out of the deferred-tick boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An event was dispatched with an id that has no registered handler.
    #[error(
        "no event handler is registered for \"{id}\"; register it with \
         register_event_db() or register_event_fx() before dispatching"
    )]
    UnregisteredEvent {
        /// The offending event id.
        id: String,
    },

    /// An event handler requested an effect with no registered handler.
    #[error(
        "event \"{event_id}\" requested the effect \"{effect_id}\", but no \
         effect handler is registered under that id; register it with \
         register_effect()"
    )]
    UnregisteredEffect {
        /// The event whose handler requested the effect.
        event_id: String,
        /// The missing effect id.
        effect_id: String,
    },

    /// `inject_coeffect` referenced a coeffect with no registered provider.
    #[error(
        "no coeffect provider is registered for \"{id}\"; register it with \
         register_coeffect() before injecting it"
    )]
    UnregisteredCoeffect {
        /// The missing coeffect id.
        id: String,
    },

    /// A subscription or one-shot query referenced an unregistered id.
    #[error(
        "no subscription handler is registered for \"{id}\"; register it \
         with register_subscription() before subscribing"
    )]
    UnregisteredSubscription {
        /// The missing subscription id.
        id: String,
    },

    /// A registered interceptor list contained an entry with no hooks.
    #[error(
        "invalid interceptor \"{interceptor_id}\" at index {index} for event \
         \"{event_id}\": it is missing a \"before\" or \"after\" hook; at \
         least one is required"
    )]
    InvalidInterceptor {
        /// The event the interceptor list was registered for.
        event_id: String,
        /// Position of the offending interceptor in the user-supplied list.
        index: usize,
        /// The offending interceptor's diagnostic id.
        interceptor_id: String,
    },

    /// A db-returning handler ran without a db coeffect in scope, which
    /// means the chain was assembled without the standard injection step.
    #[error(
        "event \"{event_id}\" reached its handler without a db coeffect; \
         the built-in injection interceptor was removed or replaced"
    )]
    MissingDbCoeffect {
        /// The event whose handler was invoked.
        event_id: String,
    },

    /// An effect payload did not have the type its handler was registered
    /// with.
    #[error(
        "event \"{event_id}\" supplied a payload of the wrong type for the \
         effect \"{effect_id}\""
    )]
    EffectPayloadType {
        /// The event whose handler produced the payload.
        event_id: String,
        /// The effect whose handler rejected the payload.
        effect_id: String,
    },

    /// A subscription was requested with a value type other than the one it
    /// was registered with.
    #[error("subscription \"{id}\" does not produce values of the requested type")]
    SubscriptionValueType {
        /// The subscription id.
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_ids() {
        let error = StoreError::UnregisteredEvent { id: "doubel".into() };
        assert!(error.to_string().contains("doubel"));
        assert!(error.to_string().contains("register_event_db"));

        let error = StoreError::UnregisteredEffect {
            event_id: "save".into(),
            effect_id: "http".into(),
        };
        let message = error.to_string();
        assert!(message.contains("save"));
        assert!(message.contains("http"));
    }
}
