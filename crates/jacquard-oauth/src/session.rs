//! Session data carried through an OAuth exchange and persisted once a
//! session is established.
//!
//! A pending authorization request ([`AuthRequestData`]) becomes an
//! established session ([`ClientSessionData`]) once the authorization code is
//! exchanged, both carrying a DPoP key and the nonce(s) seen so far
//! ([`DpopReqData`]/[`DpopClientData`]) so proofs replay correctly across the
//! handful of requests each flow makes.

use std::sync::Arc;
use std::time::Duration;

use jacquard_common::{CowStr, IntoStatic, types::{did::Did, string::Datetime}};
use jose_jwk::Key;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    atproto::AtprotoClientMetadata,
    authstore::ClientAuthStore,
    config::RetryPolicy,
    dpop::{DpopDataSource, DpopExt},
    error::{OAuthError, Result},
    keyset::Keyset,
    request::OAuthMetadata,
    resolver::OAuthResolver,
    retry::with_backoff,
    scopes::Scope,
    storage::{MemoryStorage, Storage, StorageError},
    types::TokenSet,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no session found for this account/session id")]
    NotFound,
    #[error("session has no unexpired access token")]
    NotAuthorized,
}

/// How long the advisory lock guarding a session refresh is held before it's
/// considered abandoned and eligible for another caller to take over.
const REFRESH_LOCK_TTL: Duration = Duration::from_secs(30);

/// Immutable client identity shared by every session a [`SessionRegistry`]
/// manages: the client's signing keys (if any) and its atproto client metadata.
#[derive(Clone, Debug)]
pub struct ClientData<'c> {
    pub keyset: Option<Keyset>,
    pub config: AtprotoClientMetadata<'c>,
}

/// DPoP key and nonce state for a request made before a session exists
/// (PAR, the initial token exchange).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DpopReqData<'d> {
    pub dpop_key: Key,
    #[serde(borrow)]
    pub dpop_authserver_nonce: Option<CowStr<'d>>,
}

impl DpopDataSource for DpopReqData<'static> {
    fn dpop_key(&self) -> &Key {
        &self.dpop_key
    }
    fn nonce(&self, is_auth_server: bool) -> Option<CowStr<'static>> {
        is_auth_server.then(|| self.dpop_authserver_nonce.clone()).flatten()
    }
    fn set_nonce(&mut self, is_auth_server: bool, nonce: CowStr<'static>) {
        if is_auth_server {
            self.dpop_authserver_nonce = Some(nonce);
        }
    }
}

impl IntoStatic for DpopReqData<'_> {
    type Output = DpopReqData<'static>;
    fn into_static(self) -> Self::Output {
        DpopReqData {
            dpop_key: self.dpop_key,
            dpop_authserver_nonce: self.dpop_authserver_nonce.map(IntoStatic::into_static),
        }
    }
}

/// DPoP key and nonce state for an established session, tracking the
/// authorization server nonce (used on refresh/revocation) and the resource
/// server nonce (used on PDS calls) independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DpopClientData<'d> {
    pub dpop_key: Key,
    #[serde(borrow)]
    pub dpop_authserver_nonce: CowStr<'d>,
    #[serde(borrow)]
    pub dpop_host_nonce: CowStr<'d>,
}

impl DpopDataSource for DpopClientData<'static> {
    fn dpop_key(&self) -> &Key {
        &self.dpop_key
    }
    fn nonce(&self, is_auth_server: bool) -> Option<CowStr<'static>> {
        let nonce = if is_auth_server {
            &self.dpop_authserver_nonce
        } else {
            &self.dpop_host_nonce
        };
        (!nonce.is_empty()).then(|| nonce.clone())
    }
    fn set_nonce(&mut self, is_auth_server: bool, nonce: CowStr<'static>) {
        if is_auth_server {
            self.dpop_authserver_nonce = nonce;
        } else {
            self.dpop_host_nonce = nonce;
        }
    }
}

impl IntoStatic for DpopClientData<'_> {
    type Output = DpopClientData<'static>;
    fn into_static(self) -> Self::Output {
        DpopClientData {
            dpop_key: self.dpop_key,
            dpop_authserver_nonce: self.dpop_authserver_nonce.into_static(),
            dpop_host_nonce: self.dpop_host_nonce.into_static(),
        }
    }
}

/// State persisted between the PAR call and the authorization callback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthRequestData<'r> {
    #[serde(borrow)]
    pub state: CowStr<'r>,
    pub authserver_url: Url,
    #[serde(borrow)]
    pub account_did: Option<Did<'r>>,
    #[serde(borrow)]
    pub scopes: Vec<Scope<'r>>,
    #[serde(borrow)]
    pub request_uri: CowStr<'r>,
    #[serde(borrow)]
    pub authserver_token_endpoint: CowStr<'r>,
    #[serde(borrow)]
    pub authserver_revocation_endpoint: Option<CowStr<'r>>,
    #[serde(borrow)]
    pub pkce_verifier: CowStr<'r>,
    #[serde(borrow)]
    pub dpop_data: DpopReqData<'r>,
}

impl IntoStatic for AuthRequestData<'_> {
    type Output = AuthRequestData<'static>;
    fn into_static(self) -> Self::Output {
        AuthRequestData {
            state: self.state.into_static(),
            authserver_url: self.authserver_url,
            account_did: self.account_did.map(IntoStatic::into_static),
            scopes: self.scopes.into_iter().map(IntoStatic::into_static).collect(),
            request_uri: self.request_uri.into_static(),
            authserver_token_endpoint: self.authserver_token_endpoint.into_static(),
            authserver_revocation_endpoint: self
                .authserver_revocation_endpoint
                .map(IntoStatic::into_static),
            pkce_verifier: self.pkce_verifier.into_static(),
            dpop_data: self.dpop_data.into_static(),
        }
    }
}

/// An established OAuth session: the tokens in hand plus enough context
/// (endpoints, scopes, DPoP state) to refresh or revoke it later.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientSessionData<'r> {
    #[serde(borrow)]
    pub account_did: Did<'r>,
    #[serde(borrow)]
    pub session_id: CowStr<'r>,
    pub host_url: Url,
    pub authserver_url: Url,
    #[serde(borrow)]
    pub authserver_token_endpoint: CowStr<'r>,
    #[serde(borrow)]
    pub authserver_revocation_endpoint: Option<CowStr<'r>>,
    #[serde(borrow)]
    pub scopes: Vec<Scope<'r>>,
    #[serde(borrow)]
    pub dpop_data: DpopClientData<'r>,
    #[serde(borrow)]
    pub token_set: TokenSet<'r>,
}

impl<'r> ClientSessionData<'r> {
    /// Replace the token set after a successful refresh, keeping every other
    /// field (scopes, endpoints, DPoP nonces already advanced by the call) unchanged.
    pub fn update_with_tokens(&mut self, token_set: TokenSet<'r>) {
        self.token_set = token_set;
    }

    pub fn is_expired(&self) -> bool {
        self.token_set
            .expires_at
            .as_ref()
            .is_some_and(|exp| exp.as_ref() <= Datetime::now().as_ref())
    }
}

impl IntoStatic for ClientSessionData<'_> {
    type Output = ClientSessionData<'static>;
    fn into_static(self) -> Self::Output {
        ClientSessionData {
            account_did: self.account_did.into_static(),
            session_id: self.session_id.into_static(),
            host_url: self.host_url,
            authserver_url: self.authserver_url,
            authserver_token_endpoint: self.authserver_token_endpoint.into_static(),
            authserver_revocation_endpoint: self
                .authserver_revocation_endpoint
                .map(IntoStatic::into_static),
            scopes: self.scopes.into_iter().map(IntoStatic::into_static).collect(),
            dpop_data: self.dpop_data.into_static(),
            token_set: self.token_set.into_static(),
        }
    }
}

/// Owns the client identity and dispatches session reads/writes (and, when
/// asked, transparent token refresh) to a [`ClientAuthStore`].
pub struct SessionRegistry<T, S>
where
    T: OAuthResolver,
    S: ClientAuthStore,
{
    pub store: Arc<S>,
    pub client: Arc<T>,
    pub client_data: ClientData<'static>,
    pub refresh_retry: RetryPolicy,
    pub storage: Arc<dyn Storage>,
}

impl<T, S> SessionRegistry<T, S>
where
    T: OAuthResolver,
    S: ClientAuthStore,
{
    pub fn new(store: S, client: Arc<T>, client_data: ClientData<'static>) -> Self {
        Self::new_shared(Arc::new(store), client, client_data)
    }

    pub fn new_shared(store: Arc<S>, client: Arc<T>, client_data: ClientData<'static>) -> Self {
        Self::with_retry_policy(store, client, client_data, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        store: Arc<S>,
        client: Arc<T>,
        client_data: ClientData<'static>,
        refresh_retry: RetryPolicy,
    ) -> Self {
        Self::with_storage(
            store,
            client,
            client_data,
            refresh_retry,
            Arc::new(MemoryStorage::new()),
        )
    }

    /// Most general constructor: also takes the [`Storage`] backend used to
    /// hold the advisory lock guarding concurrent refreshes of the same session.
    pub fn with_storage(
        store: Arc<S>,
        client: Arc<T>,
        client_data: ClientData<'static>,
        refresh_retry: RetryPolicy,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            store,
            client,
            client_data,
            refresh_retry,
            storage,
        }
    }
}

impl<T, S> SessionRegistry<T, S>
where
    T: OAuthResolver + DpopExt + Send + Sync + 'static,
    S: ClientAuthStore + Send + Sync + 'static,
{
    /// Fetch a session, refreshing its access token first when `refresh` is set
    /// and the session has expired, persisting the refreshed tokens before returning.
    pub async fn get(
        &self,
        did: &Did<'_>,
        session_id: &str,
        refresh: bool,
    ) -> Result<ClientSessionData<'static>> {
        let session = self
            .store
            .get_session(did, session_id)
            .await?
            .ok_or(OAuthError::Session(Error::NotFound))?
            .into_static();

        if refresh && session.is_expired() {
            let lock_id = format!("{}:{session_id}", did.as_ref());
            let refreshed = crate::storage::with_lock(
                self.storage.as_ref(),
                "atproto:session-refresh",
                &lock_id,
                REFRESH_LOCK_TTL,
                || async {
                    let metadata = OAuthMetadata::new(self.client.as_ref(), &self.client_data, &session)
                        .await
                        .map_err(|e| StorageError::Backend(Box::new(e)))?;
                    let refreshed = with_backoff(
                        &self.refresh_retry,
                        || crate::request::refresh(self.client.as_ref(), session.clone(), &metadata),
                        |attempt, err, delay| {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(attempt, ?delay, error = %err, "retrying token refresh");
                            #[cfg(not(feature = "tracing"))]
                            let _ = (attempt, err, delay);
                        },
                    )
                    .await
                    .map_err(|e| StorageError::Backend(Box::new(e)))?;
                    self.set(refreshed.clone())
                        .await
                        .map_err(|e| StorageError::Backend(Box::new(e)))?;
                    Ok(refreshed)
                },
            )
            .await?;
            Ok(refreshed)
        } else {
            Ok(session)
        }
    }

    pub async fn set(&self, data: ClientSessionData<'_>) -> Result<()> {
        Ok(self.store.upsert_session(data).await?)
    }

    pub async fn del(&self, did: &Did<'_>, session_id: &str) -> Result<()> {
        Ok(self.store.delete_session(did, session_id).await?)
    }
}

/// A standalone DPoP-bound OAuth token holder, independent of the session
/// store/registry machinery above; used where only the key and tokens need
/// to travel together (e.g. a session handed off across a process boundary).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OauthSession<'s> {
    pub dpop_key: Key,
    #[serde(borrow)]
    pub token_set: TokenSet<'s>,
}

impl IntoStatic for OauthSession<'_> {
    type Output = OauthSession<'static>;

    fn into_static(self) -> Self::Output {
        OauthSession {
            dpop_key: self.dpop_key,
            token_set: self.token_set.into_static(),
        }
    }
}
