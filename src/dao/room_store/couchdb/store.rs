use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::{task::AbortHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::dao::{
    models::RoomEntity,
    patch::{RoomUpdate, apply_update},
    room_store::{ChangeFeed, RoomChange, RoomFeed, RoomStore},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, ChangesResponse, CouchRoomDocument, ROOM_PREFIX, room_doc_id,
        room_id_from_doc_id,
    },
};

const FEED_CAPACITY: usize = 64;
const LISTENER_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const LISTENER_MAX_DELAY: Duration = Duration::from_secs(10);

/// Aborts the `_changes` listener once the last store handle is dropped.
struct ListenerGuard(AbortHandle);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Connection details shared by the store and its changes listener.
#[derive(Clone)]
struct CouchClient {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchClient {
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn database_request(&self, method: Method) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, self.database);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }
}

/// Room store backed by a CouchDB database, one document per room.
#[derive(Clone)]
pub struct CouchRoomStore {
    couch: CouchClient,
    feed: Arc<ChangeFeed>,
    _listener: Arc<ListenerGuard>,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB, ensure the database exists and start following its
    /// changes feed.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let couch = CouchClient {
            client,
            base_url: Arc::<str>::from(config.base_url.trim_end_matches('/')),
            database: Arc::<str>::from(config.database),
            auth: config
                .username
                .zip(config.password)
                .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p))),
        };

        ensure_database(&couch).await?;

        let feed = Arc::new(ChangeFeed::new(FEED_CAPACITY));
        let listener = tokio::spawn(follow_changes(
            couch.clone(),
            feed.clone(),
            config.changes_timeout,
        ));

        Ok(Self {
            couch,
            feed,
            _listener: Arc::new(ListenerGuard(listener.abort_handle())),
        })
    }

    async fn get_document(&self, doc_id: &str) -> CouchResult<Option<CouchRoomDocument>> {
        let response = self
            .couch
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Value>()
                .await
                .map(|raw| Some(CouchRoomDocument::from_raw(raw)))
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document(&self, doc_id: &str, document: CouchRoomDocument) -> CouchResult<()> {
        let response = self
            .couch
            .request(Method::PUT, doc_id)
            .json(&document.into_raw(doc_id))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_room_documents(&self) -> CouchResult<Vec<String>> {
        const ALL_DOCS: &str = "_all_docs";
        let start = format!("\"{ROOM_PREFIX}\"");
        let end = format!("\"{ROOM_PREFIX}\u{fff0}\"");
        let response = self
            .couch
            .request(Method::GET, ALL_DOCS)
            .query(&[("startkey", start), ("endkey", end)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let body = response
            .json::<AllDocsResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            })?;
        Ok(body
            .rows
            .iter()
            .filter_map(|row| room_id_from_doc_id(&row.id))
            .map(str::to_owned)
            .collect())
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<()> {
        let response = self
            .couch
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }
}

fn decode_room(room_id: &str, body: Value) -> StorageResult<RoomEntity> {
    serde_json::from_value(body).map_err(|source| StorageError::Corrupt {
        room_id: room_id.to_owned(),
        source,
    })
}

async fn ensure_database(couch: &CouchClient) -> CouchResult<()> {
    let database = couch.database.to_string();
    let response = couch
        .database_request(Method::GET)
        .send()
        .await
        .map_err(|source| CouchDaoError::DatabaseQuery {
            database: database.clone(),
            source,
        })?;

    match response.status() {
        StatusCode::OK => Ok(()),
        StatusCode::NOT_FOUND => {
            let create = couch
                .database_request(Method::PUT)
                .send()
                .await
                .map_err(|source| CouchDaoError::DatabaseCreate {
                    database: database.clone(),
                    source,
                })?;
            if create.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::DatabaseStatus {
                    database,
                    status: create.status(),
                })
            }
        }
        other => Err(CouchDaoError::DatabaseStatus {
            database,
            status: other,
        }),
    }
}

/// Long-poll the `_changes` endpoint forever, republishing room documents as snapshots.
async fn follow_changes(couch: CouchClient, feed: Arc<ChangeFeed>, timeout: Duration) {
    let mut since = Value::String("now".into());
    let mut delay = LISTENER_INITIAL_DELAY;

    loop {
        match poll_changes(&couch, &since, timeout).await {
            Ok(changes) => {
                delay = LISTENER_INITIAL_DELAY;
                for row in changes.results {
                    let Some(room_id) = room_id_from_doc_id(&row.id) else {
                        continue;
                    };
                    let revision = row.generation();
                    let room = if row.deleted {
                        None
                    } else {
                        let body = row
                            .doc
                            .map(|raw| CouchRoomDocument::from_raw(raw).body)
                            .unwrap_or(Value::Null);
                        match decode_room(room_id, body) {
                            Ok(room) => Some(Arc::new(room)),
                            Err(err) => {
                                warn!(room = room_id, error = %err, "skipping undecodable room change");
                                continue;
                            }
                        }
                    };
                    debug!(room = room_id, revision, "room change received from CouchDB");
                    feed.publish(RoomChange {
                        room_id: room_id.to_owned(),
                        revision,
                        room,
                    });
                }
                since = changes.last_seq;
            }
            Err(err) => {
                warn!(error = %err, "CouchDB changes feed failed; retrying");
                sleep(delay).await;
                delay = (delay * 2).min(LISTENER_MAX_DELAY);
            }
        }
    }
}

async fn poll_changes(
    couch: &CouchClient,
    since: &Value,
    timeout: Duration,
) -> CouchResult<ChangesResponse> {
    const CHANGES: &str = "_changes";
    let since = match since {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let query = [
        ("feed", "longpoll".to_string()),
        ("include_docs", "true".to_string()),
        ("since", since),
        ("timeout", timeout.as_millis().to_string()),
    ];

    let response = couch
        .request(Method::GET, CHANGES)
        .query(&query)
        .send()
        .await
        .map_err(|source| CouchDaoError::RequestSend {
            path: CHANGES.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(CouchDaoError::RequestStatus {
            path: CHANGES.to_string(),
            status: response.status(),
        });
    }

    response
        .json::<ChangesResponse>()
        .await
        .map_err(|source| CouchDaoError::DecodeResponse {
            path: CHANGES.to_string(),
            source,
        })
}

impl RoomStore for CouchRoomStore {
    fn create_room(&self, room_id: &str, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move {
            let doc_id = room_doc_id(&room_id);
            let body = serde_json::to_value(&room).map_err(|source| StorageError::Corrupt {
                room_id: room_id.clone(),
                source,
            })?;
            let document = CouchRoomDocument { rev: None, body };
            match store.put_document(&doc_id, document).await {
                Err(CouchDaoError::RevisionConflict { .. }) => {
                    Err(StorageError::RoomExists { room_id })
                }
                other => other.map_err(Into::into),
            }
        })
    }

    fn fetch_room(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move {
            let doc_id = room_doc_id(&room_id);
            match store.get_document(&doc_id).await? {
                Some(document) => decode_room(&room_id, document.body).map(Some),
                None => Ok(None),
            }
        })
    }

    fn update_room(
        &self,
        room_id: &str,
        update: RoomUpdate,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move {
            let doc_id = room_doc_id(&room_id);
            let mut document = store
                .get_document(&doc_id)
                .await?
                .ok_or_else(|| StorageError::RoomNotFound {
                    room_id: room_id.clone(),
                })?;

            apply_update(&mut document.body, &update)
                .map_err(|err| err.into_storage_error(&room_id))?;
            let room = decode_room(&room_id, document.body.clone())?;

            // A concurrent writer bumps the revision; CouchDB answers 409 and the caller retries
            // against the fresh document, re-checking every precondition.
            store
                .put_document(&doc_id, document)
                .await
                .map_err(|err| match err {
                    CouchDaoError::RevisionConflict { .. } => StorageError::Conflict {
                        room_id: room_id.clone(),
                    },
                    other => other.into(),
                })?;
            Ok(room)
        })
    }

    fn delete_room(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move {
            let doc_id = room_doc_id(&room_id);
            let Some(document) = store.get_document(&doc_id).await? else {
                return Ok(false);
            };
            let Some(rev) = document.rev else {
                return Ok(false);
            };
            store
                .delete_document(&doc_id, &rev)
                .await
                .map_err(|err| match err {
                    CouchDaoError::RevisionConflict { .. } => StorageError::Conflict {
                        room_id: room_id.clone(),
                    },
                    other => other.into(),
                })?;
            info!(room = %room_id, "room document deleted");
            Ok(true)
        })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        Box::pin(async move { store.list_room_documents().await.map_err(StorageError::from) })
    }

    fn observe(&self, room_id: &str) -> RoomFeed {
        self.feed.subscribe(room_id)
    }

    fn mutations(&self) -> RoomFeed {
        self.feed.subscribe_all()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let couch = self.couch.clone();
        Box::pin(async move {
            let path = format!("{}/{}", couch.base_url, couch.database);
            let response = couch
                .database_request(Method::GET)
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: path.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let couch = self.couch.clone();
        Box::pin(async move { ensure_database(&couch).await.map_err(Into::into) })
    }
}
