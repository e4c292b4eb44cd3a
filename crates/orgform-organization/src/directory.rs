use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::OnceCell;

use crate::entity::OrganizationEntity;
use crate::error::OrganizationError;
use crate::organization::Organization;

/// Source of the organization's accounts, queried once at the start of a run.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
  /// The master (management) account, if the directory knows it.
  async fn master_account(&self) -> Result<Option<OrganizationEntity>, OrganizationError>;

  /// Member accounts, excluding the master account.
  async fn list_accounts(&self) -> Result<Vec<OrganizationEntity>, OrganizationError>;

  async fn organizational_units(&self) -> Result<Vec<OrganizationEntity>, OrganizationError>;

  /// Query the directory and assemble the organization model.
  async fn load(&self) -> Result<Organization, OrganizationError> {
    let master = self.master_account().await?;
    let accounts = self.list_accounts().await?;
    let units = self.organizational_units().await?;
    Organization::new(master, accounts, units)
  }
}

/// On-disk layout of an organization file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationFile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub master_account: Option<OrganizationEntity>,
  #[serde(default)]
  pub accounts: Vec<OrganizationEntity>,
  #[serde(default)]
  pub organizational_units: Vec<OrganizationEntity>,
}

/// Organization directory backed by a JSON file.
///
/// The file is read on first use and cached for the lifetime of the directory.
pub struct FileOrganizationDirectory {
  path: PathBuf,
  file: OnceCell<OrganizationFile>,
}

impl FileOrganizationDirectory {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      file: OnceCell::new(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  async fn file(&self) -> Result<&OrganizationFile, OrganizationError> {
    self
      .file
      .get_or_try_init(|| async {
        let text = fs::read_to_string(&self.path)
          .await
          .map_err(|source| OrganizationError::Io {
            path: self.path.clone(),
            source,
          })?;
        Ok::<_, OrganizationError>(serde_json::from_str(&text)?)
      })
      .await
  }
}

#[async_trait]
impl OrganizationDirectory for FileOrganizationDirectory {
  async fn master_account(&self) -> Result<Option<OrganizationEntity>, OrganizationError> {
    Ok(self.file().await?.master_account.clone())
  }

  async fn list_accounts(&self) -> Result<Vec<OrganizationEntity>, OrganizationError> {
    Ok(self.file().await?.accounts.clone())
  }

  async fn organizational_units(&self) -> Result<Vec<OrganizationEntity>, OrganizationError> {
    Ok(self.file().await?.organizational_units.clone())
  }
}

#[async_trait]
impl OrganizationDirectory for Organization {
  async fn master_account(&self) -> Result<Option<OrganizationEntity>, OrganizationError> {
    Ok(Organization::master_account(self).cloned())
  }

  async fn list_accounts(&self) -> Result<Vec<OrganizationEntity>, OrganizationError> {
    Ok(self.accounts().to_vec())
  }

  async fn organizational_units(&self) -> Result<Vec<OrganizationEntity>, OrganizationError> {
    Ok(Organization::organizational_units(self).to_vec())
  }
}
