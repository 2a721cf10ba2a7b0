//! Strongly-typed identifiers for FlowRunner entities.
//!
//! Each id is a `domain_key::Uuid<D>` wrapper: `Copy`, 16 bytes, with
//! full serde support and compile-time protection against mixing
//! identifiers from different domains (you cannot pass a `NodeId`
//! where an `ExecutionId` is expected).

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(AccountIdDomain => AccountId);
define_uuid!(FlowIdDomain => FlowId);
define_uuid!(ExecutionIdDomain => ExecutionId);
define_uuid!(NodeIdDomain => NodeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_copy_and_non_nil() {
        let a = AccountId::v4();
        let b = a;
        assert_eq!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn ids_round_trip_through_json() {
        let id = ExecutionId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: ExecutionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ids_parse_from_string() {
        let id = NodeId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn invalid_string_fails_to_parse() {
        assert!(FlowId::parse("not-a-uuid").is_err());
    }
}
