use serde::Serialize;

use crate::error::DispatchError;

/// Uniform outcome of a dispatch. Exactly one side carries the value:
/// when `error` is set, `answer` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn success(answer: String) -> Self {
        Self {
            answer,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            answer: String::new(),
            error: Some(message),
        }
    }

    /// Tuple form: `(answer, error)`.
    pub fn into_parts(self) -> (String, Option<String>) {
        (self.answer, self.error)
    }

    pub fn into_result(self) -> Result<String, String> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.answer),
        }
    }
}

impl From<Result<String, DispatchError>> for QueryResult {
    fn from(result: Result<String, DispatchError>) -> Self {
        match result {
            Ok(answer) => Self::success(answer),
            Err(e) => Self::error(e.to_string()),
        }
    }
}
