use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field under which an error message is reported.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ErrorField {
    Url,
    Server,
    Token,
}

/// `{"errors": {"json": {<field>: [<message>]}}}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub errors: NestedErrors,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NestedErrors {
    pub json: BTreeMap<ErrorField, Vec<String>>,
}

impl ErrorPayload {
    pub fn new(field: ErrorField, message: impl Into<String>) -> Self {
        Self {
            errors: NestedErrors {
                json: BTreeMap::from([(field, vec![message.into()])]),
            },
        }
    }

    pub fn messages(&self, field: ErrorField) -> &[String] {
        self.errors
            .json
            .get(&field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
