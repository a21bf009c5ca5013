//! In-memory stand-ins for the application and KYC services.

use crate::domain::collaborators::{ApplicationDirectory, ApplicationSnapshot, KycDirectory};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default, Clone)]
pub struct InMemoryApplicationDirectory {
    applications: Arc<RwLock<HashMap<String, ApplicationSnapshot>>>,
}

impl InMemoryApplicationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, application: ApplicationSnapshot) {
        let mut applications = self.applications.write().await;
        applications.insert(application.id.clone(), application);
    }
}

#[async_trait]
impl ApplicationDirectory for InMemoryApplicationDirectory {
    async fn application(&self, id: &str) -> Result<Option<ApplicationSnapshot>> {
        let applications = self.applications.read().await;
        Ok(applications.get(id).cloned())
    }

    async fn mark_application_fee_paid(&self, id: &str) -> Result<bool> {
        let mut applications = self.applications.write().await;
        match applications.get_mut(id) {
            Some(application) if !application.application_fee_paid => {
                application.application_fee_paid = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryKycDirectory {
    verified: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryKycDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_verified(&self, landlord_id: &str, verified: bool) {
        let mut set = self.verified.write().await;
        if verified {
            set.insert(landlord_id.to_string());
        } else {
            set.remove(landlord_id);
        }
    }
}

#[async_trait]
impl KycDirectory for InMemoryKycDirectory {
    async fn is_verified(&self, landlord_id: &str) -> Result<bool> {
        let verified = self.verified.read().await;
        Ok(verified.contains(landlord_id))
    }
}

/// JSON fixture describing the directory state, used by the CLI.
#[derive(Debug, Deserialize, Default)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub applications: Vec<ApplicationSnapshot>,
    #[serde(default)]
    pub verified_landlords: Vec<String>,
}

impl DirectoryFixture {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    pub async fn into_directories(self) -> (InMemoryApplicationDirectory, InMemoryKycDirectory) {
        let applications = InMemoryApplicationDirectory::new();
        for application in self.applications {
            applications.upsert(application).await;
        }
        let kyc = InMemoryKycDirectory::new();
        for landlord in &self.verified_landlords {
            kyc.set_verified(landlord, true).await;
        }
        (applications, kyc)
    }
}
