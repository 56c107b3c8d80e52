use std::fmt::Debug;

use kube::api::{Api, ListParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::adapters::reference;
use crate::error::{Error, Result};

const PAGE_SIZE: u32 = 500;

/// Any namespaced object the downscaler can fetch and replace.
pub(crate) trait ClusterResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ClusterResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

fn api_for<K: ClusterResource>(client: &Client, resource: &K) -> Api<K> {
    Api::namespaced(client.clone(), &resource.namespace().unwrap_or_default())
}

/// Lists every object of kind `K`, following continue tokens until the last page.
/// `None` lists across all namespaces.
pub(crate) async fn list<K: ClusterResource>(client: &Client, namespace: Option<&str>) -> Result<Vec<K>> {
    let api: Api<K> = match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    let list_error = |source| Error::List {
        resource: K::plural(&()).to_string(),
        scope: namespace.unwrap_or("all namespaces").to_string(),
        source,
    };

    let mut params = ListParams::default().limit(PAGE_SIZE);
    let mut items = Vec::new();
    loop {
        let page = api.list(&params).await.map_err(list_error)?;
        items.extend(page.items);
        match page.metadata.continue_ {
            Some(token) if !token.is_empty() => params = params.continue_token(&token),
            _ => break,
        }
    }
    debug!("listed {} {} in {}", items.len(), K::plural(&()), namespace.unwrap_or("all namespaces"));
    Ok(items)
}

/// Fetches the current server state of `resource`.
pub(crate) async fn reget<K: ClusterResource>(client: &Client, resource: &K) -> Result<K> {
    api_for(client, resource)
        .get(&resource.name_any())
        .await
        .map_err(|source| Error::Kube {
            action: "get",
            target: reference(resource),
            source,
        })
}

/// Replaces the server object with `resource`. Stale objects are rejected by the
/// API server with a conflict.
pub(crate) async fn update<K: ClusterResource>(client: &Client, resource: &K) -> Result<K> {
    api_for(client, resource)
        .replace(&resource.name_any(), &PostParams::default(), resource)
        .await
        .map_err(|source| Error::Kube {
            action: "update",
            target: reference(resource),
            source,
        })
}
