//! Namespace and task queue administration

use super::ProxyClient;
use crate::error::{Result, SdkError};
use durable_proxy_core::protocol::messages::{
    DescribeTaskQueueRequest, NamespaceDeprecateRequest, NamespaceDescribeRequest, NamespaceInfo,
    NamespaceListRequest, NamespaceRegisterRequest, NamespaceUpdateRequest, PollerInfo,
};
use durable_proxy_core::WorkerKind;

/// Parameters for registering or updating a namespace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceOptions {
    pub name: String,
    pub description: Option<String>,
    pub owner_email: Option<String>,
    /// Days closed workflow histories are kept
    pub retention_days: Option<i32>,
    pub security_token: Option<String>,
}

impl NamespaceOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_owner_email(mut self, owner_email: impl Into<String>) -> Self {
        self.owner_email = Some(owner_email.into());
        self
    }

    pub fn with_retention_days(mut self, days: i32) -> Self {
        self.retention_days = Some(days);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SdkError::InvalidConfiguration(
                "namespace name must not be empty".to_string(),
            ));
        }
        if self.retention_days.is_some_and(|d| d < 0) {
            return Err(SdkError::InvalidConfiguration(format!(
                "retention days must not be negative for namespace '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

/// One page of [`ProxyClient::list_namespaces`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespacePage {
    pub namespaces: Vec<NamespaceInfo>,
    /// Pass back to fetch the next page; `None` on the last page
    pub next_page_token: Option<Vec<u8>>,
}

impl ProxyClient {
    pub async fn register_namespace(&self, options: NamespaceOptions) -> Result<()> {
        options.validate()?;
        self.call(NamespaceRegisterRequest {
            name: Some(options.name),
            description: options.description,
            owner_email: options.owner_email,
            retention_days: options.retention_days,
            security_token: options.security_token,
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    pub async fn describe_namespace(&self, name: &str) -> Result<NamespaceInfo> {
        let reply = self
            .call(NamespaceDescribeRequest {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .await?;
        reply.info.ok_or_else(|| {
            SdkError::MalformedMessage(format!(
                "describe of namespace '{}' returned no namespace info",
                name
            ))
        })
    }

    pub async fn update_namespace(&self, options: NamespaceOptions) -> Result<()> {
        options.validate()?;
        self.call(NamespaceUpdateRequest {
            name: Some(options.name),
            description: options.description,
            owner_email: options.owner_email,
            retention_days: options.retention_days,
            security_token: options.security_token,
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    pub async fn deprecate_namespace(&self, name: &str, security_token: Option<&str>) -> Result<()> {
        self.call(NamespaceDeprecateRequest {
            name: Some(name.to_string()),
            security_token: security_token.map(str::to_string),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    pub async fn list_namespaces(
        &self,
        page_size: i32,
        next_page_token: Option<Vec<u8>>,
    ) -> Result<NamespacePage> {
        if page_size <= 0 {
            return Err(SdkError::InvalidConfiguration(format!(
                "page size must be positive, got {}",
                page_size
            )));
        }
        let reply = self
            .call(NamespaceListRequest {
                page_size: Some(page_size),
                next_page_token,
                ..Default::default()
            })
            .await?;
        Ok(NamespacePage {
            namespaces: reply.namespaces.unwrap_or_default(),
            next_page_token: reply.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Pollers attached to a task queue in the client's namespace
    pub async fn describe_task_queue(&self, task_queue: &str, kind: WorkerKind) -> Result<Vec<PollerInfo>> {
        let reply = self
            .call(DescribeTaskQueueRequest {
                name: Some(task_queue.to_string()),
                namespace: Some(self.settings().namespace.clone()),
                kind: Some(kind),
                ..Default::default()
            })
            .await?;
        Ok(reply.pollers.unwrap_or_default())
    }
}
