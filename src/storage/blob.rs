//! Blob listing for ABS workspaces
//!
//! Only listing is needed: the writer probes a container to find out whether an
//! object is a single blob or a directory of slices.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Blob listing client
#[async_trait]
pub trait BlobLister: Send + Sync {
    /// Names of all blobs in `container` under `prefix`
    async fn list_blobs(&self, container: &str, prefix: &str) -> Result<Vec<String>>;
}

/// Parsed Azure storage connection string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsCredentials {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub blob_endpoint: Option<String>,
}

impl AbsCredentials {
    /// Parse `Key=Value;Key=Value` connection strings
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let mut credentials = Self::default();
        for part in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                Error::config(format!("Malformed connection string segment '{part}'"))
            })?;
            let value = value.to_string();
            match key.trim() {
                "AccountName" => credentials.account_name = Some(value),
                "AccountKey" => credentials.account_key = Some(value),
                "SharedAccessSignature" => credentials.sas_token = Some(value),
                "BlobEndpoint" => credentials.blob_endpoint = Some(value),
                _ => {}
            }
        }

        if credentials.account_name.is_none() {
            credentials.account_name = credentials
                .blob_endpoint
                .as_deref()
                .and_then(account_from_endpoint);
        }
        if credentials.account_name.is_none() {
            return Err(Error::config(
                "Connection string does not name a storage account",
            ));
        }
        Ok(credentials)
    }
}

fn account_from_endpoint(endpoint: &str) -> Option<String> {
    let host = url::Url::parse(endpoint).ok()?.host_str()?.to_string();
    host.split('.').next().map(String::from)
}

/// [`BlobLister`] backed by `object_store`
#[derive(Debug, Default)]
pub struct ObjectStoreBlobLister {
    credentials: AbsCredentials,
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl ObjectStoreBlobLister {
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        Ok(Self {
            credentials: AbsCredentials::from_connection_string(connection_string)?,
            stores: HashMap::new(),
        })
    }

    /// Use a prepared store for one container
    #[must_use]
    pub fn with_store(mut self, container: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(container.into(), store);
        self
    }

    fn store(&self, container: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(store) = self.stores.get(container) {
            return Ok(Arc::clone(store));
        }

        let mut builder = MicrosoftAzureBuilder::new().with_container_name(container);
        if let Some(account) = &self.credentials.account_name {
            builder = builder.with_account(account);
        }
        if let Some(key) = &self.credentials.account_key {
            builder = builder.with_access_key(key);
        }
        if let Some(sas) = &self.credentials.sas_token {
            builder = builder.with_config(AzureConfigKey::SasKey, sas);
        }
        if let Some(endpoint) = &self.credentials.blob_endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }
        Ok(Arc::new(builder.build()?))
    }
}

#[async_trait]
impl BlobLister for ObjectStoreBlobLister {
    async fn list_blobs(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        let store = self.store(container)?;
        let prefix = ObjectPath::from(prefix);
        let names: Vec<String> = store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        Ok(names)
    }
}
