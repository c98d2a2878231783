use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::backend::{AuthApi, BackendError, SignUpOutcome, SignUpRequest, TableApi};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Participant,
    Investor,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Participant => "participant",
            AccountType::Investor => "investor",
        }
    }

    /// Table that holds the account's domain row
    pub fn table(&self) -> &'static str {
        match self {
            AccountType::Participant => "participants",
            AccountType::Investor => "investors",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error("Invalid signup: {0}")]
    Invalid(String),
    #[error("Account created but no {0} row was inserted")]
    RowNotInserted(&'static str),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SignupForm {
    fn validate(&self) -> Result<(), SignupError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(SignupError::Invalid("email address is required".to_string()));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(SignupError::Invalid(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.full_name.trim().is_empty() {
            return Err(SignupError::Invalid("full name is required".to_string()));
        }
        Ok(())
    }
}

pub struct SignupService {
    auth: Arc<dyn AuthApi>,
    tables: Arc<dyn TableApi>,
}

impl SignupService {
    pub fn new(auth: Arc<dyn AuthApi>, tables: Arc<dyn TableApi>) -> Self {
        Self { auth, tables }
    }

    pub fn from_backend<B: AuthApi + TableApi + 'static>(backend: Arc<B>) -> Self {
        Self::new(backend.clone(), backend)
    }

    /// Create the auth account, then the participant or investor row keyed
    /// by the new user id
    pub async fn register(&self, form: &SignupForm, account_type: AccountType) -> Result<SignUpOutcome, SignupError> {
        form.validate()?;

        let request = SignUpRequest {
            email: form.email.trim().to_string(),
            password: form.password.clone(),
            metadata: json!({
                "full_name": form.full_name.trim(),
                "account_type": account_type.as_str(),
            }),
        };
        let outcome = self.auth.sign_up(&request).await?;

        let mut row = json!({
            "user_id": outcome.user.id,
            "full_name": form.full_name.trim(),
            "email": request.email,
        });
        if account_type == AccountType::Investor {
            row["company_name"] = json!(form.company_name);
        }

        let inserted = self.tables.insert(account_type.table(), row).await?;
        if inserted.rows.is_empty() {
            return Err(SignupError::RowNotInserted(account_type.table()));
        }

        info!("Registered {} account for {}", account_type.as_str(), request.email);
        Ok(outcome)
    }
}
