//! A fake hosting service on a wiremock server: API listings, share pages and
//! direct download bodies.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const FOLDER_INFO: &str = "/api/1.4/folder/get_info.php";
pub const FOLDER_CONTENT: &str = "/api/1.4/folder/get_content.php";
pub const FILE_INFO: &str = "/api/file/get_info.php";

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub key: String,
    pub name: String,
    pub body: Vec<u8>,
    /// Hash published by the API; defaults to the real digest of `body`.
    pub published_hash: Option<String>,
    pub publish_size: bool,
    /// Share page reports the file as removed.
    pub removed: bool,
}

impl FakeFile {
    pub fn new(key: &str, name: &str, body: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            body: body.to_vec(),
            published_hash: Some(sha256_hex(body)),
            publish_size: true,
            removed: false,
        }
    }

    #[allow(dead_code)]
    pub fn with_published_hash(mut self, hash: Option<&str>) -> Self {
        self.published_hash = hash.map(str::to_string);
        self
    }

    #[allow(dead_code)]
    pub fn removed(mut self) -> Self {
        self.removed = true;
        self
    }

    fn api_json(&self) -> Value {
        let mut file = json!({
            "quickkey": self.key,
            "filename": self.name,
        });
        if self.publish_size {
            // The API sends sizes as strings.
            file["size"] = json!(self.body.len().to_string());
        }
        if let Some(hash) = &self.published_hash {
            file["hash"] = json!(hash);
        }
        file
    }

    pub fn share_path(&self) -> String {
        format!("/file/{}/file", self.key)
    }

    pub fn body_path(&self) -> String {
        format!("/dl/{}", self.key)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn ok(payload: Value) -> ResponseTemplate {
    let mut response = json!({ "result": "Success" });
    if let (Some(target), Some(source)) = (response.as_object_mut(), payload.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
    ResponseTemplate::new(200).set_body_json(json!({ "response": response }))
}

/// Mounts the share page and the direct body for one file.
pub async fn mount_file_pages(server: &MockServer, file: &FakeFile) {
    let page = if file.removed {
        "<html><body><h1>The file has been removed.</h1></body></html>".to_string()
    } else {
        format!(
            "<html><body><a class=\"input popsok\" id=\"downloadButton\" href=\"{}{}\">Download</a></body></html>",
            server.uri(),
            file.body_path()
        )
    };
    Mock::given(method("GET"))
        .and(path(file.share_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(file.body_path()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(file.body.clone()))
        .mount(server)
        .await;
}

/// Mounts `file/get_info` plus pages for a single-file link.
#[allow(dead_code)]
pub async fn mount_single_file(server: &MockServer, file: &FakeFile) {
    Mock::given(method("GET"))
        .and(path(FILE_INFO))
        .and(query_param("quick_key", file.key.as_str()))
        .respond_with(ok(json!({ "file_info": file.api_json() })))
        .mount(server)
        .await;
    mount_file_pages(server, file).await;
}

/// Mounts info and a single-chunk listing for one folder, plus pages for its files.
pub async fn mount_folder(
    server: &MockServer,
    key: &str,
    name: &str,
    files: &[FakeFile],
    subfolders: &[(&str, &str)],
) {
    Mock::given(method("GET"))
        .and(path(FOLDER_INFO))
        .and(query_param("folder_key", key))
        .respond_with(ok(json!({ "folder_info": { "folderkey": key, "name": name } })))
        .mount(server)
        .await;

    let listed: Vec<Value> = files.iter().map(FakeFile::api_json).collect();
    Mock::given(method("GET"))
        .and(path(FOLDER_CONTENT))
        .and(query_param("folder_key", key))
        .and(query_param("content_type", "files"))
        .respond_with(ok(json!({
            "folder_content": { "files": listed, "more_chunks": "no" }
        })))
        .mount(server)
        .await;

    let folders: Vec<Value> = subfolders
        .iter()
        .map(|(k, n)| json!({ "folderkey": k, "name": n }))
        .collect();
    Mock::given(method("GET"))
        .and(path(FOLDER_CONTENT))
        .and(query_param("folder_key", key))
        .and(query_param("content_type", "folders"))
        .respond_with(ok(json!({
            "folder_content": { "folders": folders, "more_chunks": "no" }
        })))
        .mount(server)
        .await;

    for file in files {
        mount_file_pages(server, file).await;
    }
}

/// Makes every listing of `key` fail with an API error.
#[allow(dead_code)]
pub async fn mount_broken_listing(server: &MockServer, key: &str) {
    Mock::given(method("GET"))
        .and(path(FOLDER_CONTENT))
        .and(query_param("folder_key", key))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "result": "Error", "error": "112", "message": "Invalid folder key" }
        })))
        .mount(server)
        .await;
}

/// Number of requests the server received for `request_path`.
#[allow(dead_code)]
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}
