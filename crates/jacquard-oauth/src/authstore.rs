use std::collections::HashMap;
use std::sync::Arc;

use jacquard_common::{IntoStatic, session::SessionStoreError, types::did::Did};
use tokio::sync::RwLock;

use crate::crypto::EncryptionService;
use crate::envelope;
use crate::session::{AuthRequestData, ClientSessionData};
use crate::storage::Storage;

#[async_trait::async_trait]
pub trait ClientAuthStore {
    async fn get_session(
        &self,
        did: &Did<'_>,
        session_id: &str,
    ) -> Result<Option<ClientSessionData<'_>>, SessionStoreError>;

    async fn upsert_session(&self, session: ClientSessionData<'_>)
    -> Result<(), SessionStoreError>;

    async fn delete_session(
        &self,
        did: &Did<'_>,
        session_id: &str,
    ) -> Result<(), SessionStoreError>;

    async fn get_auth_req_info(
        &self,
        state: &str,
    ) -> Result<Option<AuthRequestData<'_>>, SessionStoreError>;

    async fn save_auth_req_info(
        &self,
        auth_req_info: &AuthRequestData<'_>,
    ) -> Result<(), SessionStoreError>;

    async fn delete_auth_req_info(&self, state: &str) -> Result<(), SessionStoreError>;
}

fn session_key(did: &Did<'_>, session_id: &str) -> String {
    format!("{}:{}", did.as_ref(), session_id)
}

/// In-memory [`ClientAuthStore`]; suitable for tests and single-process
/// development, matching the session crate's `MemorySessionStore` idiom.
/// Sessions do not persist across restarts.
#[derive(Clone, Default)]
pub struct MemoryAuthStore {
    sessions: Arc<RwLock<HashMap<String, ClientSessionData<'static>>>>,
    auth_requests: Arc<RwLock<HashMap<String, AuthRequestData<'static>>>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ClientAuthStore for MemoryAuthStore {
    async fn get_session(
        &self,
        did: &Did<'_>,
        session_id: &str,
    ) -> Result<Option<ClientSessionData<'_>>, SessionStoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session_key(did, session_id))
            .cloned())
    }

    async fn upsert_session(
        &self,
        session: ClientSessionData<'_>,
    ) -> Result<(), SessionStoreError> {
        let key = session_key(&session.account_did, &session.session_id);
        self.sessions.write().await.insert(key, session.into_static());
        Ok(())
    }

    async fn delete_session(
        &self,
        did: &Did<'_>,
        session_id: &str,
    ) -> Result<(), SessionStoreError> {
        self.sessions.write().await.remove(&session_key(did, session_id));
        Ok(())
    }

    async fn get_auth_req_info(
        &self,
        state: &str,
    ) -> Result<Option<AuthRequestData<'_>>, SessionStoreError> {
        Ok(self.auth_requests.read().await.get(state).cloned())
    }

    async fn save_auth_req_info(
        &self,
        auth_req_info: &AuthRequestData<'_>,
    ) -> Result<(), SessionStoreError> {
        self.auth_requests
            .write()
            .await
            .insert(auth_req_info.state.to_string(), auth_req_info.clone().into_static());
        Ok(())
    }

    async fn delete_auth_req_info(&self, state: &str) -> Result<(), SessionStoreError> {
        self.auth_requests.write().await.remove(state);
        Ok(())
    }
}

const SESSION_INFO: &[u8] = b"atproto:session";
const AUTH_REQUEST_INFO: &[u8] = b"atproto:auth-request";

fn to_store_err<E: std::error::Error + Send + Sync + 'static>(err: E) -> SessionStoreError {
    SessionStoreError::Other(Box::new(err))
}

fn storage_session_key(did: &Did<'_>, session_id: &str) -> String {
    format!("atproto:session:{}:{}", did.as_ref(), session_id)
}

fn storage_auth_request_key(state: &str) -> String {
    format!("atproto:state:{state}")
}

/// [`ClientAuthStore`] backed by a [`Storage`] backend. Every record is
/// sealed with [`envelope::seal`]/[`envelope::open`] before it reaches the
/// backend and opened on read, so the backend only ever sees ciphertext.
#[derive(Clone)]
pub struct StorageAuthStore {
    storage: Arc<dyn Storage>,
    encryption: Arc<EncryptionService>,
}

impl StorageAuthStore {
    pub fn new(storage: Arc<dyn Storage>, encryption: Arc<EncryptionService>) -> Self {
        Self { storage, encryption }
    }
}

#[async_trait::async_trait]
impl ClientAuthStore for StorageAuthStore {
    async fn get_session(
        &self,
        did: &Did<'_>,
        session_id: &str,
    ) -> Result<Option<ClientSessionData<'_>>, SessionStoreError> {
        let key = storage_session_key(did, session_id);
        let Some(sealed) = self.storage.get(&key).await.map_err(to_store_err)? else {
            return Ok(None);
        };
        let plaintext = envelope::open(&self.encryption, SESSION_INFO, &sealed, key.as_bytes())
            .map_err(to_store_err)?;
        let session: ClientSessionData<'_> = serde_json::from_slice(&plaintext)?;
        Ok(Some(session.into_static()))
    }

    async fn upsert_session(
        &self,
        session: ClientSessionData<'_>,
    ) -> Result<(), SessionStoreError> {
        let key = storage_session_key(&session.account_did, &session.session_id);
        let plaintext = serde_json::to_vec(&session)?;
        let sealed = envelope::seal(&self.encryption, SESSION_INFO, &plaintext, key.as_bytes())
            .map_err(to_store_err)?;
        self.storage.set(&key, sealed, None).await.map_err(to_store_err)
    }

    async fn delete_session(
        &self,
        did: &Did<'_>,
        session_id: &str,
    ) -> Result<(), SessionStoreError> {
        let key = storage_session_key(did, session_id);
        self.storage.delete(&key).await.map_err(to_store_err)
    }

    async fn get_auth_req_info(
        &self,
        state: &str,
    ) -> Result<Option<AuthRequestData<'_>>, SessionStoreError> {
        let key = storage_auth_request_key(state);
        let Some(sealed) = self.storage.get(&key).await.map_err(to_store_err)? else {
            return Ok(None);
        };
        let plaintext = envelope::open(&self.encryption, AUTH_REQUEST_INFO, &sealed, key.as_bytes())
            .map_err(to_store_err)?;
        let auth_req: AuthRequestData<'_> = serde_json::from_slice(&plaintext)?;
        Ok(Some(auth_req.into_static()))
    }

    async fn save_auth_req_info(
        &self,
        auth_req_info: &AuthRequestData<'_>,
    ) -> Result<(), SessionStoreError> {
        let key = storage_auth_request_key(&auth_req_info.state);
        let plaintext = serde_json::to_vec(auth_req_info)?;
        let sealed = envelope::seal(&self.encryption, AUTH_REQUEST_INFO, &plaintext, key.as_bytes())
            .map_err(to_store_err)?;
        self.storage.set(&key, sealed, None).await.map_err(to_store_err)
    }

    async fn delete_auth_req_info(&self, state: &str) -> Result<(), SessionStoreError> {
        let key = storage_auth_request_key(state);
        self.storage.delete(&key).await.map_err(to_store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacquard_common::CowStr;
    use jacquard_common::types::string::Did as DidType;

    #[tokio::test]
    async fn session_roundtrip() {
        let store = MemoryAuthStore::new();
        let did = DidType::new_static("did:plc:alice").unwrap();
        assert!(store.get_session(&did, "s1").await.unwrap().is_none());

        let session = ClientSessionData {
            account_did: did.clone(),
            session_id: CowStr::from("s1"),
            host_url: url::Url::parse("https://pds").unwrap(),
            authserver_url: url::Url::parse("https://issuer").unwrap(),
            authserver_token_endpoint: CowStr::from("https://issuer/token"),
            authserver_revocation_endpoint: None,
            scopes: vec![],
            dpop_data: crate::session::DpopClientData {
                dpop_key: crate::utils::generate_key(&[CowStr::from("ES256")]).unwrap(),
                dpop_authserver_nonce: CowStr::from(""),
                dpop_host_nonce: CowStr::from(""),
            },
            token_set: crate::types::TokenSet {
                iss: CowStr::from("https://issuer"),
                sub: did.clone(),
                aud: CowStr::from("https://pds"),
                scope: None,
                refresh_token: None,
                access_token: CowStr::from("abc"),
                token_type: crate::types::OAuthTokenType::DPoP,
                expires_at: None,
            },
        };
        store.upsert_session(session).await.unwrap();
        assert!(store.get_session(&did, "s1").await.unwrap().is_some());
        store.delete_session(&did, "s1").await.unwrap();
        assert!(store.get_session(&did, "s1").await.unwrap().is_none());
    }

    fn test_session(did: &DidType<'static>) -> ClientSessionData<'static> {
        ClientSessionData {
            account_did: did.clone(),
            session_id: CowStr::from("s1"),
            host_url: url::Url::parse("https://pds").unwrap(),
            authserver_url: url::Url::parse("https://issuer").unwrap(),
            authserver_token_endpoint: CowStr::from("https://issuer/token"),
            authserver_revocation_endpoint: None,
            scopes: vec![crate::scopes::Scope::parse("atproto").unwrap()],
            dpop_data: crate::session::DpopClientData {
                dpop_key: crate::utils::generate_key(&[CowStr::from("ES256")]).unwrap(),
                dpop_authserver_nonce: CowStr::from(""),
                dpop_host_nonce: CowStr::from(""),
            },
            token_set: crate::types::TokenSet {
                iss: CowStr::from("https://issuer"),
                sub: did.clone(),
                aud: CowStr::from("https://pds"),
                scope: None,
                refresh_token: Some(CowStr::from("refresh-tok")),
                access_token: CowStr::from("abc"),
                token_type: crate::types::OAuthTokenType::DPoP,
                expires_at: None,
            },
        }
    }

    #[tokio::test]
    async fn storage_auth_store_session_roundtrip_is_encrypted_at_rest() {
        let storage = Arc::new(crate::storage::MemoryStorage::new());
        let encryption = Arc::new(EncryptionService::new(&[9u8; 32]).unwrap());
        let store = StorageAuthStore::new(storage.clone(), encryption);

        let did = DidType::new_static("did:plc:alice").unwrap();
        assert!(store.get_session(&did, "s1").await.unwrap().is_none());

        store.upsert_session(test_session(&did)).await.unwrap();

        let raw = storage
            .get(&storage_session_key(&did, "s1"))
            .await
            .unwrap()
            .unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("abc"));

        let loaded = store.get_session(&did, "s1").await.unwrap().unwrap();
        assert_eq!(loaded.token_set.access_token.as_ref(), "abc");
        assert_eq!(loaded.token_set.refresh_token.as_deref(), Some("refresh-tok"));
        assert_eq!(loaded.scopes, vec![crate::scopes::Scope::parse("atproto").unwrap()]);

        store.delete_session(&did, "s1").await.unwrap();
        assert!(store.get_session(&did, "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn storage_auth_store_auth_request_roundtrip() {
        let storage = Arc::new(crate::storage::MemoryStorage::new());
        let encryption = Arc::new(EncryptionService::new(&[10u8; 32]).unwrap());
        let store = StorageAuthStore::new(storage, encryption);

        let auth_req = AuthRequestData {
            state: CowStr::from("state-1"),
            authserver_url: url::Url::parse("https://issuer").unwrap(),
            account_did: None,
            scopes: vec![crate::scopes::Scope::parse("atproto").unwrap()],
            request_uri: CowStr::from("urn:ietf:params:oauth:request_uri:abc"),
            authserver_token_endpoint: CowStr::from("https://issuer/token"),
            authserver_revocation_endpoint: None,
            pkce_verifier: CowStr::from("verifier"),
            dpop_data: crate::session::DpopReqData {
                dpop_key: crate::utils::generate_key(&[CowStr::from("ES256")]).unwrap(),
                dpop_authserver_nonce: None,
            },
        };

        assert!(store.get_auth_req_info("state-1").await.unwrap().is_none());
        store.save_auth_req_info(&auth_req).await.unwrap();
        let loaded = store.get_auth_req_info("state-1").await.unwrap().unwrap();
        assert_eq!(loaded.request_uri.as_ref(), "urn:ietf:params:oauth:request_uri:abc");
        store.delete_auth_req_info("state-1").await.unwrap();
        assert!(store.get_auth_req_info("state-1").await.unwrap().is_none());
    }
}
