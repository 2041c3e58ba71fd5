use serde::{Deserialize, Serialize};

use crate::{JobResult, JobStatus, RequestId, ResultRow, RowKey, RunMode};

/// A partial, field-level update of [`crate::SessionState`].
///
/// `None` means "field absent from the patch". Nullable fields use a nested
/// option so a patch can also set them back to `None`; on the wire an absent
/// key and an explicit `null` stay distinct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub min_price: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub max_price: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub min_volume: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_mode: Option<RunMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<ResultRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub error: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub request_id: Option<Option<RequestId>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub job_status: Option<Option<JobStatus>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub job_result: Option<Option<JobResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub job_error: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none", with = "nullable")]
    pub selection: Option<Option<RowKey>>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        *self == Patch::default()
    }

    /// Prepares a patch received from another context for local merging.
    ///
    /// Errors are local to the context that hit them: the incoming values are
    /// dropped and the local error fields are reset. Loading flags describe
    /// the sender's own requests and are dropped as well.
    pub fn into_received(mut self) -> Self {
        self.error = Some(None);
        self.job_error = Some(None);
        self.loading = None;
        self.job_loading = None;
        self
    }
}

/// Serde helpers for `Option<Option<T>>` fields: absent key -> `None`,
/// `null` -> `Some(None)`, value -> `Some(Some(value))`.
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_and_null_stay_distinct_on_the_wire() {
        let patch = Patch {
            request_id: Some(None),
            progress: Some(0.5),
            ..Patch::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({ "request_id": null, "progress": 0.5 }));

        let parsed: Patch = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, patch);
        assert_eq!(parsed.job_error, None);
    }

    #[test]
    fn received_patch_clears_errors() {
        let patch = Patch {
            error: Some(Some("boom".into())),
            from_date: Some("2026-02-01".into()),
            ..Patch::default()
        }
        .into_received();
        assert_eq!(patch.error, Some(None));
        assert_eq!(patch.job_error, Some(None));
        assert_eq!(patch.from_date.as_deref(), Some("2026-02-01"));
    }

    #[test]
    fn received_patch_drops_loading_flags() {
        let patch = Patch {
            loading: Some(true),
            job_loading: Some(true),
            rows: Some(Vec::new()),
            ..Patch::default()
        }
        .into_received();
        assert_eq!(patch.loading, None);
        assert_eq!(patch.job_loading, None);
        assert_eq!(patch.rows, Some(Vec::new()));
    }
}
