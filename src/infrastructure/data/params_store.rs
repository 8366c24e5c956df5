// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::params::ScoringParameters;
use crate::infrastructure::data::db::Database;
use sqlx::Row;

impl Database {
    /// Insert a new parameter version. When `make_active` is set, the
    /// previous active row for the same configuration is deactivated in
    /// the same transaction, so exactly one row stays active per name.
    pub async fn save_scoring_parameters(
        &self,
        params: &ScoringParameters,
        config_name: &str,
        version: i64,
        make_active: bool,
    ) -> Result<i64, AppError> {
        params.validate()?;
        let params_json = serde_json::to_string(params)
            .map_err(|e| AppError::Database(format!("encode parameters: {e}")))?;

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("begin failed: {e}")))?;

        if make_active {
            sqlx::query(
                "UPDATE scoring_parameters SET is_active = 0 WHERE config_name = ? AND is_active = 1",
            )
            .bind(config_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("deactivate failed: {e}")))?;
        }

        let row = sqlx::query(
            r#"
            INSERT INTO scoring_parameters (config_name, version, is_active, params_json)
            VALUES (?, ?, ?, ?)
            RETURNING params_id
            "#,
        )
        .bind(config_name)
        .bind(version)
        .bind(make_active)
        .bind(params_json)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::Database(format!("parameters insert failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("commit failed: {e}")))?;

        let params_id: i64 = row.get("params_id");
        tracing::info!(
            config = config_name,
            version,
            params_id,
            active = make_active,
            "scoring parameters saved"
        );
        Ok(params_id)
    }

    /// Load the active parameter set for a configuration. Missing active
    /// parameters are an error; the caller decides whether to seed
    /// defaults.
    pub async fn load_active_scoring_parameters(
        &self,
        config_name: &str,
    ) -> Result<ScoringParameters, AppError> {
        let row = sqlx::query(
            r#"
            SELECT params_json FROM scoring_parameters
            WHERE config_name = ? AND is_active = 1
            ORDER BY activated_at DESC
            LIMIT 1
            "#,
        )
        .bind(config_name)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::Database(format!("active parameters query failed: {e}")))?;

        let Some(row) = row else {
            return Err(AppError::DataMissing(format!(
                "no active scoring parameters for config '{config_name}'"
            )));
        };
        let raw: String = row.get("params_json");
        let params: ScoringParameters = serde_json::from_str(&raw)
            .map_err(|e| AppError::Database(format!("decode parameters: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    /// Id of the active parameter row, None when nothing is active yet.
    pub async fn active_params_id(&self, config_name: &str) -> Result<Option<i64>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT params_id FROM scoring_parameters
            WHERE config_name = ? AND is_active = 1
            ORDER BY activated_at DESC
            LIMIT 1
            "#,
        )
        .bind(config_name)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::Database(format!("active params id query failed: {e}")))?;
        Ok(row.map(|r| r.get("params_id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_load_active_round_trips() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let params = ScoringParameters::default_strategy();
        let id = db
            .save_scoring_parameters(&params, "test_cfg", 1, true)
            .await
            .unwrap();
        assert!(id > 0);

        let loaded = db.load_active_scoring_parameters("test_cfg").await.unwrap();
        assert_eq!(loaded, params);
        assert_eq!(db.active_params_id("test_cfg").await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn activating_new_version_deactivates_previous() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let v1 = ScoringParameters::default_strategy();
        let mut v2 = v1.clone();
        v2.max_pools = 7;

        db.save_scoring_parameters(&v1, "cfg", 1, true).await.unwrap();
        let id2 = db.save_scoring_parameters(&v2, "cfg", 2, true).await.unwrap();

        let loaded = db.load_active_scoring_parameters("cfg").await.unwrap();
        assert_eq!(loaded.max_pools, 7);
        assert_eq!(db.active_params_id("cfg").await.unwrap(), Some(id2));

        // Exactly one active row remains.
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scoring_parameters WHERE config_name = 'cfg' AND is_active = 1",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn inactive_insert_does_not_change_active() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let v1 = ScoringParameters::default_strategy();
        let id1 = db.save_scoring_parameters(&v1, "cfg", 1, true).await.unwrap();
        db.save_scoring_parameters(&v1, "cfg", 2, false).await.unwrap();
        assert_eq!(db.active_params_id("cfg").await.unwrap(), Some(id1));
    }

    #[tokio::test]
    async fn missing_active_parameters_is_data_missing() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        assert!(matches!(
            db.load_active_scoring_parameters("nope").await,
            Err(AppError::DataMissing(_))
        ));
    }

    #[tokio::test]
    async fn invalid_parameters_are_rejected_before_insert() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let mut bad = ScoringParameters::default_strategy();
        bad.min_allocation = 0.9;
        bad.max_allocation = 0.1;
        assert!(db
            .save_scoring_parameters(&bad, "cfg", 1, true)
            .await
            .is_err());
    }
}
