use crate::Error;
use crate::config::BoxStoreConfig;
use async_trait::async_trait;
use boxfs_auth::TokenProvider;
use boxfs_core::{
    ByteStream, NodeKind, RemoteNode, RemoteStore, SearchQuery, SharedLinkOptions, StoreError,
    StoreResult,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fields requested for folder listings.
const LIST_FIELDS: &str = "id,name,type,size,modified_at,created_at,path_collection,parent";
const LIST_LIMIT: u32 = 1000;

/// `RemoteStore` over the Box content API.
///
/// Every request carries a bearer token from `tokens`; a 401 response
/// invalidates it so the following call re-authenticates.
#[derive(Debug, Clone)]
pub struct BoxStore {
    api_url: String,
    upload_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl BoxStore {
    pub fn new(config: BoxStoreConfig, tokens: Arc<dyn TokenProvider>) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::InvalidConfiguration(e.to_string()))?;
        Ok(Self::with_client(config, client, tokens))
    }

    pub fn with_client(
        config: BoxStoreConfig,
        client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            upload_url: config.upload_url.trim_end_matches('/').to_owned(),
            client,
            tokens,
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    fn upload(&self, path: &str) -> String {
        format!("{}{path}", self.upload_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        let token = self.tokens.token().await?;
        let response = request.bearer_auth(&token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!("Box API rejected the access token");
            self.tokens.invalidate(&token).await;
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Error> {
        let body = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_item(&self, request: RequestBuilder) -> StoreResult<RemoteNode> {
        let item: BoxItem = self.send_json(request).await?;
        item.into_node()
            .ok_or_else(|| Error::UnexpectedResponse("item is neither file nor folder".into()).into())
    }

    fn item_url(kind: NodeKind, id: &str) -> String {
        match kind {
            NodeKind::File => format!("/files/{id}"),
            NodeKind::Folder => format!("/folders/{id}"),
        }
    }

    async fn update_item(
        &self,
        kind: NodeKind,
        id: &str,
        body: &UpdateItemRequest<'_>,
    ) -> StoreResult<RemoteNode> {
        debug!(%kind, id, "updating item");
        let request = self.client.put(self.api(&Self::item_url(kind, id))).json(body);
        self.send_item(request).await
    }

    async fn copy_item(
        &self,
        kind: NodeKind,
        id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> StoreResult<RemoteNode> {
        debug!(%kind, id, new_parent_id, ?new_name, "copying item");
        let body = CopyItemRequest {
            parent: ParentRef { id: new_parent_id },
            name: new_name,
        };
        let url = self.api(&format!("{}/copy", Self::item_url(kind, id)));
        self.send_item(self.client.post(url).json(&body)).await
    }

    async fn upload_content(&self, url: String, form: Form) -> StoreResult<RemoteNode> {
        let collection: BoxItemCollection = self.send_json(self.client.post(url).multipart(form)).await?;
        collection
            .entries
            .into_iter()
            .find_map(BoxItem::into_node)
            .ok_or_else(|| Error::UnexpectedResponse("upload returned no entries".into()).into())
    }

    async fn download_response(&self, file_id: &str) -> Result<Response, Error> {
        debug!(file_id, "downloading file");
        let url = self.api(&format!("/files/{file_id}/content"));
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Err(Error::UnexpectedResponse(format!(
                "file {file_id} is not ready for download yet"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for BoxStore {
    async fn list_folder(&self, folder_id: &str) -> StoreResult<Vec<RemoteNode>> {
        debug!(folder_id, "listing folder");
        let limit = LIST_LIMIT.to_string();
        let request = self
            .client
            .get(self.api(&format!("/folders/{folder_id}/items")))
            .query(&[("limit", limit.as_str()), ("offset", "0"), ("fields", LIST_FIELDS)]);
        let collection: BoxItemCollection = self.send_json(request).await?;
        if collection
            .total_count
            .is_some_and(|total| total > collection.entries.len() as u64)
        {
            debug!(folder_id, "listing holds more entries than one page");
        }
        Ok(collection
            .entries
            .into_iter()
            .filter_map(BoxItem::into_node)
            .collect())
    }

    async fn get_file_info(&self, file_id: &str) -> StoreResult<RemoteNode> {
        self.send_item(self.client.get(self.api(&format!("/files/{file_id}"))))
            .await
    }

    async fn get_folder_info(&self, folder_id: &str) -> StoreResult<RemoteNode> {
        self.send_item(self.client.get(self.api(&format!("/folders/{folder_id}"))))
            .await
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> StoreResult<RemoteNode> {
        debug!(parent_id, name, "creating folder");
        let body = CreateFolderRequest {
            name,
            parent: ParentRef { id: parent_id },
        };
        self.send_item(self.client.post(self.api("/folders")).json(&body))
            .await
    }

    async fn upload_file(&self, parent_id: &str, name: &str, bytes: Bytes) -> StoreResult<RemoteNode> {
        debug!(parent_id, name, len = bytes.len(), "uploading file");
        let attributes = serde_json::to_string(&UploadAttributes {
            name,
            parent: ParentRef { id: parent_id },
        })
        .map_err(Error::from)?;
        let len = bytes.len() as u64;
        let form = Form::new().text("attributes", attributes).part(
            "file",
            Part::stream_with_length(bytes, len).file_name(name.to_owned()),
        );
        self.upload_content(self.upload("/files/content"), form).await
    }

    async fn upload_file_version(&self, file_id: &str, bytes: Bytes) -> StoreResult<RemoteNode> {
        debug!(file_id, len = bytes.len(), "uploading new file version");
        let len = bytes.len() as u64;
        let form = Form::new().part(
            "file",
            Part::stream_with_length(bytes, len).file_name("file"),
        );
        self.upload_content(self.upload(&format!("/files/{file_id}/content")), form)
            .await
    }

    async fn download_file(&self, file_id: &str) -> StoreResult<Bytes> {
        let response = self.download_response(file_id).await?;
        Ok(response.bytes().await.map_err(Error::from)?)
    }

    async fn open_download_stream(&self, file_id: &str) -> StoreResult<ByteStream> {
        let response = self.download_response(file_id).await?;
        let stream = response.bytes_stream().map_err(std::io::Error::other).boxed();
        Ok(Box::new(stream))
    }

    async fn delete_file(&self, file_id: &str) -> StoreResult<()> {
        debug!(file_id, "deleting file");
        self.send(self.client.delete(self.api(&format!("/files/{file_id}"))))
            .await?;
        Ok(())
    }

    async fn delete_folder(&self, folder_id: &str, recursive: bool) -> StoreResult<()> {
        debug!(folder_id, recursive, "deleting folder");
        let request = self
            .client
            .delete(self.api(&format!("/folders/{folder_id}")))
            .query(&[("recursive", if recursive { "true" } else { "false" })]);
        self.send(request).await?;
        Ok(())
    }

    async fn move_file(&self, file_id: &str, new_parent_id: &str) -> StoreResult<RemoteNode> {
        let body = UpdateItemRequest::parent(new_parent_id);
        self.update_item(NodeKind::File, file_id, &body).await
    }

    async fn move_folder(&self, folder_id: &str, new_parent_id: &str) -> StoreResult<RemoteNode> {
        let body = UpdateItemRequest::parent(new_parent_id);
        self.update_item(NodeKind::Folder, folder_id, &body).await
    }

    async fn rename_file(&self, file_id: &str, new_name: &str) -> StoreResult<RemoteNode> {
        let body = UpdateItemRequest::name(new_name);
        self.update_item(NodeKind::File, file_id, &body).await
    }

    async fn rename_folder(&self, folder_id: &str, new_name: &str) -> StoreResult<RemoteNode> {
        let body = UpdateItemRequest::name(new_name);
        self.update_item(NodeKind::Folder, folder_id, &body).await
    }

    async fn copy_file(
        &self,
        file_id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> StoreResult<RemoteNode> {
        self.copy_item(NodeKind::File, file_id, new_parent_id, new_name)
            .await
    }

    async fn copy_folder(
        &self,
        folder_id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> StoreResult<RemoteNode> {
        self.copy_item(NodeKind::Folder, folder_id, new_parent_id, new_name)
            .await
    }

    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<RemoteNode>> {
        debug!(query = %query.query, kind = ?query.kind, "searching");
        let mut params = vec![
            ("query", query.query.clone()),
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(kind) = query.kind {
            params.push(("type", kind.to_string()));
        }
        let request = self.client.get(self.api("/search")).query(&params);
        let collection: BoxItemCollection = self.send_json(request).await?;
        Ok(collection
            .entries
            .into_iter()
            .filter_map(BoxItem::into_node)
            .collect())
    }

    async fn create_shared_link(
        &self,
        file_id: &str,
        options: &SharedLinkOptions,
    ) -> StoreResult<RemoteNode> {
        debug!(file_id, access = ?options.access, "creating shared link");
        let body = SharedLinkRequest {
            shared_link: options,
        };
        let request = self
            .client
            .put(self.api(&format!("/files/{file_id}")))
            .query(&[("fields", "id,type,name,size,modified_at,parent,shared_link")])
            .json(&body);
        self.send_item(request).await
    }
}

fn api_error(status: u16, body: &[u8]) -> Error {
    let parsed: Option<BoxErrorBody> = serde_json::from_slice(body).ok();
    let fallback = || {
        let text = String::from_utf8_lossy(body).trim().to_owned();
        if text.is_empty() {
            StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed")
                .to_owned()
        } else {
            text
        }
    };
    match parsed {
        Some(parsed) => {
            let conflict = parsed
                .context_info
                .and_then(|info| info.conflicts)
                .and_then(BoxConflicts::first);
            Error::Api {
                status,
                code: parsed.code,
                message: parsed
                    .message
                    .or(parsed.error_description)
                    .unwrap_or_else(fallback),
                conflict_kind: conflict.as_ref().and_then(BoxConflict::kind),
                conflict_id: conflict.map(|c| c.id),
            }
        }
        None => Error::Api {
            status,
            code: None,
            message: fallback(),
            conflict_id: None,
            conflict_kind: None,
        },
    }
}

// Models

#[derive(Serialize)]
struct ParentRef<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct CreateFolderRequest<'a> {
    name: &'a str,
    parent: ParentRef<'a>,
}

#[derive(Serialize)]
struct UploadAttributes<'a> {
    name: &'a str,
    parent: ParentRef<'a>,
}

#[derive(Serialize)]
struct UpdateItemRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<ParentRef<'a>>,
}

impl<'a> UpdateItemRequest<'a> {
    fn name(name: &'a str) -> Self {
        Self {
            name: Some(name),
            parent: None,
        }
    }

    fn parent(id: &'a str) -> Self {
        Self {
            name: None,
            parent: Some(ParentRef { id }),
        }
    }
}

#[derive(Serialize)]
struct CopyItemRequest<'a> {
    parent: ParentRef<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct SharedLinkRequest<'a> {
    shared_link: &'a SharedLinkOptions,
}

#[derive(Deserialize)]
struct BoxItemCollection {
    #[serde(default)]
    entries: Vec<BoxItem>,
    total_count: Option<u64>,
}

#[derive(Deserialize)]
struct BoxItem {
    #[serde(rename = "type")]
    item_type: String,
    id: String,
    #[serde(default)]
    name: String,
    size: Option<u64>,
    modified_at: Option<DateTime<Utc>>,
    mime_type: Option<String>,
    parent: Option<BoxParent>,
    shared_link: Option<BoxSharedLink>,
}

impl BoxItem {
    /// Web links and other item types have no place in the tree.
    fn into_node(self) -> Option<RemoteNode> {
        let kind = match self.item_type.as_str() {
            "file" => NodeKind::File,
            "folder" => NodeKind::Folder,
            _ => return None,
        };
        Some(RemoteNode {
            kind,
            id: self.id,
            name: self.name,
            size: self.size,
            modified_at: self.modified_at,
            mime_type: self.mime_type,
            parent_id: self.parent.map(|p| p.id),
            shared_link: self.shared_link.map(|l| l.url),
        })
    }
}

#[derive(Deserialize)]
struct BoxParent {
    id: String,
}

#[derive(Deserialize)]
struct BoxSharedLink {
    url: String,
}

#[derive(Deserialize)]
struct BoxErrorBody {
    code: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    context_info: Option<BoxContextInfo>,
}

#[derive(Deserialize)]
struct BoxContextInfo {
    conflicts: Option<BoxConflicts>,
}

/// Folder conflicts arrive as a list, file conflicts as a single object.
#[derive(Deserialize)]
#[serde(untagged)]
enum BoxConflicts {
    Many(Vec<BoxConflict>),
    One(BoxConflict),
}

impl BoxConflicts {
    fn first(self) -> Option<BoxConflict> {
        match self {
            BoxConflicts::Many(items) => items.into_iter().next(),
            BoxConflicts::One(item) => Some(item),
        }
    }
}

#[derive(Deserialize)]
struct BoxConflict {
    id: String,
    #[serde(rename = "type")]
    item_type: Option<String>,
}

impl BoxConflict {
    fn kind(&self) -> Option<NodeKind> {
        match self.item_type.as_deref()? {
            "file" => Some(NodeKind::File),
            "folder" => Some(NodeKind::Folder),
            _ => None,
        }
    }
}
