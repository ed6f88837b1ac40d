//! Identifier Service
//!
//! Issues `{ORG}-{year}-{code}-{seq:06}` identifiers by reading the highest
//! issued identifier for the prefix and incrementing its sequence.
//!
//! Two concurrent generators can read the same maximum. The unique index on
//! `diplomas.identifier` turns the losing insert into a storage error.

use std::sync::Arc;

use verity_core::{IdentifierPrefix, ValidationError, VerityResult, MAX_SEQUENCE};
use verity_storage::RegistryStore;

#[derive(Clone)]
pub struct IdentifierGenerator {
    storage: Arc<dyn RegistryStore>,
    org: String,
}

impl IdentifierGenerator {
    pub fn new(storage: Arc<dyn RegistryStore>, org: impl Into<String>) -> Self {
        Self {
            storage,
            org: org.into(),
        }
    }

    /// Next identifier for a graduation year and diploma type label.
    pub async fn generate(&self, graduation_year: i32, diploma_type: &str) -> VerityResult<String> {
        let prefix = IdentifierPrefix::new(self.org.as_str(), graduation_year, diploma_type);
        let latest = self
            .storage
            .diploma_latest_identifier(&prefix.to_string())
            .await?;

        let sequence = match latest {
            None => 1,
            Some(identifier) => match prefix.sequence_of(&identifier) {
                Some(current) => current.saturating_add(1),
                None => {
                    tracing::warn!(%identifier, "Unparsable identifier sequence, restarting at 1");
                    1
                }
            },
        };

        if sequence > MAX_SEQUENCE {
            return Err(ValidationError::InvalidValue {
                field: "identifier".to_string(),
                reason: format!("sequence exhausted for prefix {prefix}"),
            }
            .into());
        }

        Ok(prefix.compose(sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_test_utils::{fixtures, MockStorage};

    fn generator(storage: &MockStorage) -> IdentifierGenerator {
        IdentifierGenerator::new(Arc::new(storage.clone()), "VB")
    }

    #[tokio::test]
    async fn test_first_identifier_starts_at_one() {
        let storage = MockStorage::new();
        let id = generator(&storage).generate(2023, "Bằng Cử nhân").await.unwrap();
        assert_eq!(id, "VB-2023-CNH-000001");
    }

    #[tokio::test]
    async fn test_sequential_generation_increments() {
        let storage = MockStorage::new();
        let generator = generator(&storage);

        let first = generator.generate(2024, "Bằng Thạc sĩ").await.unwrap();
        storage
            .diploma_insert(&fixtures::sample_record("QH-1", &first))
            .await
            .unwrap();
        let second = generator.generate(2024, "Bằng Thạc sĩ").await.unwrap();

        assert_eq!(first, "VB-2024-THS-000001");
        assert_eq!(second, "VB-2024-THS-000002");
    }

    #[tokio::test]
    async fn test_prefixes_are_independent() {
        let storage = MockStorage::new();
        storage
            .diploma_insert(&fixtures::sample_record("QH-1", "VB-2023-CNH-000041"))
            .await
            .unwrap();

        let generator = generator(&storage);
        assert_eq!(
            generator.generate(2023, "cu nhan").await.unwrap(),
            "VB-2023-CNH-000042"
        );
        assert_eq!(
            generator.generate(2023, "Bằng Tiến sĩ").await.unwrap(),
            "VB-2023-TSI-000001"
        );
        assert_eq!(
            generator.generate(2022, "Bằng Cử nhân").await.unwrap(),
            "VB-2022-CNH-000001"
        );
    }

    #[tokio::test]
    async fn test_non_sequence_tails_do_not_hide_latest() {
        let storage = MockStorage::new();
        for (number, identifier) in [
            ("QH-1", "VB-2023-CNH-000007"),
            ("QH-2", "VB-2023-CNH-legacy"),
            ("QH-3", "VB-2023-CNH-1000000"),
        ] {
            storage
                .diploma_insert(&fixtures::sample_record(number, identifier))
                .await
                .unwrap();
        }

        let id = generator(&storage).generate(2023, "Bằng Cử nhân").await.unwrap();
        assert_eq!(id, "VB-2023-CNH-000008");
    }

    #[tokio::test]
    async fn test_legacy_only_prefix_starts_at_one() {
        let storage = MockStorage::new();
        storage
            .diploma_insert(&fixtures::sample_record("QH-1", "VB-2023-CNH-legacy"))
            .await
            .unwrap();

        let id = generator(&storage).generate(2023, "Bằng Cử nhân").await.unwrap();
        assert_eq!(id, "VB-2023-CNH-000001");
    }

    #[tokio::test]
    async fn test_exhausted_prefix_is_rejected() {
        let storage = MockStorage::new();
        storage
            .diploma_insert(&fixtures::sample_record("QH-1", "VB-2023-CNH-999999"))
            .await
            .unwrap();

        let err = generator(&storage)
            .generate(2023, "Bằng Cử nhân")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            verity_core::VerityError::Validation(ValidationError::InvalidValue { .. })
        ));
    }
}
