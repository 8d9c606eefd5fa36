#![allow(dead_code)]

//! A `wiremock` server standing in for both the origin repository (GET) and the remote
//! object store (HEAD/PUT). Objects live in a shared map so a PUT is visible to later
//! HEAD and GET requests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use base64::Engine;
use md5::{Digest, Md5};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_length: Option<usize>,
}

#[derive(Default)]
struct State {
    objects: Mutex<HashMap<String, Object>>,
    failing: Mutex<HashSet<String>>,
}

struct ObjectResponder {
    state: Arc<State>,
}

fn header(request: &wiremock::Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

impl Respond for ObjectResponder {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let path = request.url.path().to_string();
        if self.state.failing.lock().unwrap().contains(&path) {
            return ResponseTemplate::new(500);
        }

        match request.method.as_str() {
            "GET" => match self.state.objects.lock().unwrap().get(&path) {
                Some(object) => ResponseTemplate::new(200).set_body_bytes(object.body.clone()),
                None => ResponseTemplate::new(404),
            },
            "HEAD" => match self.state.objects.lock().unwrap().get(&path) {
                Some(object) => {
                    let md5 = base64::engine::general_purpose::STANDARD
                        .encode(Md5::digest(&object.body));
                    ResponseTemplate::new(200)
                        .insert_header("Content-MD5", md5.as_str())
                        .insert_header("Content-Length", object.body.len().to_string().as_str())
                        .set_body_bytes(object.body.clone())
                }
                None => ResponseTemplate::new(404),
            },
            "PUT" => {
                let object = Object {
                    body: request.body.clone(),
                    content_type: header(request, "content-type"),
                };
                self.state.objects.lock().unwrap().insert(path, object);
                ResponseTemplate::new(201)
            }
            _ => ResponseTemplate::new(405),
        }
    }
}

pub struct FakeServer {
    server: MockServer,
    state: Arc<State>,
}

impl FakeServer {
    pub async fn start(files: Vec<(&str, Vec<u8>)>) -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(State::default());
        {
            let mut objects = state.objects.lock().unwrap();
            for (path, body) in files {
                objects.insert(
                    path.to_string(),
                    Object {
                        body,
                        content_type: None,
                    },
                );
            }
        }

        Mock::given(any())
            .respond_with(ObjectResponder {
                state: Arc::clone(&state),
            })
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn object(&self, path: &str) -> Option<Object> {
        self.state.objects.lock().unwrap().get(path).cloned()
    }

    /// Every request to `path` is answered with 500.
    pub fn fail(&self, path: &str) {
        self.state.failing.lock().unwrap().insert(path.to_string());
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| Request {
                method: r.method.to_string(),
                path: r.url.path().to_string(),
                authorization: header(r, "authorization"),
                content_length: header(r, "content-length").and_then(|v| v.parse().ok()),
            })
            .collect()
    }
}
