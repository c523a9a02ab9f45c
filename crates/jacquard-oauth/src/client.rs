//! Public entry points tying identity resolution, PAR/token exchange, DPoP
//! and session storage together into a single client/session pair:
//! [`OAuthClient::start_auth`], [`OAuthClient::callback`], [`OAuthClient::restore`],
//! [`OAuthClient::revoke`], [`OAuthSession::refresh`], [`OAuthSession::auth_headers`]
//! and [`OAuthSession::is_authorized`].

use crate::{
    atproto::atproto_client_metadata,
    authstore::ClientAuthStore,
    dpop::{DpopDataSource as _, DpopExt, build_dpop_proof},
    error::{CallbackError, Result},
    request::{OAuthMetadata, exchange_code, par},
    resolver::OAuthResolver,
    scopes::Scope,
    session::{self, ClientData, ClientSessionData, DpopClientData, SessionRegistry},
    types::{AuthorizeOptions, CallbackParams},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jacquard_common::{AuthorizationToken, CowStr, IntoStatic, types::did::Did};
use jacquard_identity::JacquardResolver;
use jose_jwk::JwkSet;
use sha2::Digest;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

pub struct OAuthClient<T, S>
where
    T: OAuthResolver,
    S: ClientAuthStore,
{
    pub registry: Arc<SessionRegistry<T, S>>,
    pub client: Arc<T>,
}

impl<S: ClientAuthStore> OAuthClient<JacquardResolver, S> {
    pub fn new(store: S, client_data: ClientData<'static>) -> Self {
        let client = JacquardResolver::default();
        Self::new_from_resolver(store, client, client_data)
    }

    /// Create an OAuth client with the provided store and default localhost client metadata.
    ///
    /// This is a convenience constructor for quickly setting up an OAuth client
    /// with default localhost redirect URIs and "atproto transition:generic" scopes.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use jacquard_oauth::client::OAuthClient;
    /// # use jacquard_oauth::authstore::MemoryAuthStore;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = MemoryAuthStore::new();
    /// let oauth = OAuthClient::with_default_config(store);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_default_config(store: S) -> Self {
        let client_data = ClientData {
            keyset: None,
            config: crate::atproto::AtprotoClientMetadata::default_localhost(),
        };
        Self::new(store, client_data)
    }
}

impl OAuthClient<JacquardResolver, crate::authstore::MemoryAuthStore> {
    /// Create an OAuth client with an in-memory auth store and default localhost client metadata.
    ///
    /// This is a convenience constructor for simple testing and development.
    /// The session will not persist across restarts.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use jacquard_oauth::client::OAuthClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let oauth = OAuthClient::with_memory_store();
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_memory_store() -> Self {
        Self::with_default_config(crate::authstore::MemoryAuthStore::new())
    }
}

impl OAuthClient<JacquardResolver, crate::authstore::StorageAuthStore> {
    /// Build a client wired to a [`crate::config::ClientConfig`]: sessions and
    /// pending auth requests are persisted (encrypted under the config's
    /// master key) to the config's storage backend, and the client's DPoP
    /// signing key is generated once and reused across restarts rather than
    /// regenerated on every call.
    pub async fn with_config(
        config: crate::config::ClientConfig,
        client_metadata: crate::atproto::AtprotoClientMetadata<'static>,
    ) -> Result<Self> {
        config.validate()?;
        let encryption = Arc::new(crate::crypto::EncryptionService::new(&config.master_key)?);
        let keyset = crate::keyset::Keyset::load_or_generate(
            config.storage.as_ref(),
            &encryption,
            client_metadata.client_id.as_str(),
        )
        .await?;
        let client_data = ClientData {
            keyset: Some(keyset),
            config: client_metadata,
        };
        let store = Arc::new(crate::authstore::StorageAuthStore::new(
            config.storage.clone(),
            encryption,
        ));
        let client = Arc::new(JacquardResolver::default());
        let registry = Arc::new(SessionRegistry::with_storage(
            store,
            client.clone(),
            client_data,
            config.refresh_retry,
            config.storage,
        ));
        Ok(Self { registry, client })
    }
}

impl<T, S> OAuthClient<T, S>
where
    T: OAuthResolver,
    S: ClientAuthStore,
{
    pub fn new_from_resolver(store: S, client: T, client_data: ClientData<'static>) -> Self {
        #[cfg(feature = "tracing")]
        tracing::info!(
            redirect_uris = ?client_data.config.redirect_uris,
            scopes = ?client_data.config.scopes,
            has_keyset = client_data.keyset.is_some(),
            "oauth client created"
        );

        let client = Arc::new(client);
        let registry = Arc::new(SessionRegistry::new(store, client.clone(), client_data));
        Self { registry, client }
    }

    pub fn new_with_shared(
        store: Arc<S>,
        client: Arc<T>,
        client_data: ClientData<'static>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new_shared(
            store,
            client.clone(),
            client_data,
        ));
        Self { registry, client }
    }
}

impl<T, S> OAuthClient<T, S>
where
    S: ClientAuthStore + Send + Sync + 'static,
    T: OAuthResolver + DpopExt + Send + Sync + 'static,
{
    /// The public half of the client's signing keys, for `jwks`/`jwks_uri` publication.
    pub fn jwks(&self) -> JwkSet {
        self.registry
            .client_data
            .keyset
            .as_ref()
            .map(|keyset| keyset.public_jwks())
            .unwrap_or_default()
    }

    /// Resolve `input` (a handle, DID, or PDS URL) to its authorization server,
    /// submit a PAR request, and return the authorization URL to redirect the
    /// user-agent to, alongside the session id to present it back under.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, input), fields(input = input.as_ref())))]
    pub async fn start_auth(
        &self,
        input: impl AsRef<str>,
        options: AuthorizeOptions<'_>,
    ) -> Result<String> {
        let client_metadata = atproto_client_metadata(
            self.registry.client_data.config.clone(),
            &self.registry.client_data.keyset,
        )?;

        let (server_metadata, identity) = self.client.resolve_oauth(input.as_ref()).await?;
        let login_hint = if identity.is_some() {
            Some(input.as_ref().into())
        } else {
            None
        };
        let metadata = OAuthMetadata {
            server_metadata,
            client_metadata,
            keyset: self.registry.client_data.keyset.clone(),
        };
        let auth_req_info =
            par(self.client.as_ref(), login_hint, options.prompt, &metadata).await?;
        self.registry
            .store
            .save_auth_req_info(&auth_req_info)
            .await?;

        #[derive(serde::Serialize)]
        struct Parameters<'s> {
            client_id: Url,
            request_uri: CowStr<'s>,
        }
        Ok(metadata.server_metadata.authorization_endpoint.to_string()
            + "?"
            + &serde_html_form::to_string(Parameters {
                client_id: metadata.client_metadata.client_id.clone(),
                request_uri: auth_req_info.request_uri,
            })
            .unwrap())
    }

    /// Complete an authorization redirect: validate `iss`, exchange the code
    /// for tokens (enforcing that the resulting `sub` matches any DID the
    /// session was already bound to), and persist the new session.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip_all, fields(state = params.state.as_ref().map(|s| s.as_ref()))))]
    pub async fn callback(&self, params: CallbackParams<'_>) -> Result<OAuthSession<T, S>> {
        let Some(state_key) = params.state else {
            return Err(CallbackError::MissingState.into());
        };

        let Some(auth_req_info) = self.registry.store.get_auth_req_info(&state_key).await? else {
            return Err(CallbackError::MissingState.into());
        };

        self.registry.store.delete_auth_req_info(&state_key).await?;

        let metadata = self
            .client
            .get_authorization_server_metadata(&auth_req_info.authserver_url)
            .await?;

        if let Some(iss) = params.iss {
            if !crate::resolver::issuer_equivalent(&iss, &metadata.issuer) {
                return Err(CallbackError::IssuerMismatch {
                    expected: metadata.issuer.to_string(),
                    got: iss.to_string(),
                }
                .into());
            }
        } else if metadata.authorization_response_iss_parameter_supported == Some(true) {
            return Err(CallbackError::MissingIssuer.into());
        }
        let metadata = OAuthMetadata {
            server_metadata: metadata,
            client_metadata: atproto_client_metadata(
                self.registry.client_data.config.clone(),
                &self.registry.client_data.keyset,
            )?,
            keyset: self.registry.client_data.keyset.clone(),
        };
        let authserver_nonce = auth_req_info.dpop_data.dpop_authserver_nonce.clone();

        let token_set = exchange_code(
            self.client.as_ref(),
            &mut auth_req_info.dpop_data.clone(),
            &params.code,
            &auth_req_info.pkce_verifier,
            &metadata,
        )
        .await?;

        if let Some(expected) = &auth_req_info.account_did {
            if expected.as_ref() != token_set.sub.as_ref() {
                return Err(CallbackError::SubjectMismatch {
                    expected: expected.to_string(),
                    got: token_set.sub.to_string(),
                }
                .into());
            }
        }

        let scopes = if let Some(scope) = &token_set.scope {
            Scope::parse_multiple_reduced(scope)
                .expect("Failed to parse scopes")
                .into_static()
        } else {
            vec![]
        };
        let session_data = ClientSessionData {
            account_did: token_set.sub.clone(),
            session_id: auth_req_info.state,
            host_url: Url::parse(&token_set.iss).expect("Failed to parse host URL"),
            authserver_url: auth_req_info.authserver_url,
            authserver_token_endpoint: auth_req_info.authserver_token_endpoint,
            authserver_revocation_endpoint: auth_req_info.authserver_revocation_endpoint,
            scopes,
            dpop_data: DpopClientData {
                dpop_key: auth_req_info.dpop_data.dpop_key.clone(),
                dpop_authserver_nonce: authserver_nonce.unwrap_or(CowStr::default()),
                dpop_host_nonce: auth_req_info
                    .dpop_data
                    .dpop_authserver_nonce
                    .unwrap_or(CowStr::default()),
            },
            token_set,
        };

        self.create_session(session_data).await
    }

    async fn create_session(&self, data: ClientSessionData<'_>) -> Result<OAuthSession<T, S>> {
        self.registry.set(data.clone()).await?;
        Ok(OAuthSession::new(
            self.registry.clone(),
            self.client.clone(),
            data.into_static(),
        ))
    }

    /// Load an existing session's current tokens.
    pub async fn restore(&self, did: &Did<'_>, session_id: &str) -> Result<OAuthSession<T, S>> {
        self.create_session(self.registry.get(did, session_id, false).await?)
            .await
    }

    /// Delete a session, best-effort revoking its refresh token at the
    /// authorization server first.
    pub async fn revoke(&self, did: &Did<'_>, session_id: &str) -> Result<()> {
        if let Ok(Some(mut data)) = self.registry.store.get_session(did, session_id).await {
            let meta = OAuthMetadata::new(self.client.as_ref(), &self.registry.client_data, &data).await;
            if let Ok(meta) = meta {
                if meta.server_metadata.revocation_endpoint.is_some() {
                    let token = data.token_set.access_token.clone();
                    crate::request::revoke(self.client.as_ref(), &mut data.dpop_data, &token, &meta)
                        .await
                        .ok();
                }
            }
        }
        Ok(self.registry.del(did, session_id).await?)
    }
}

/// Headers to attach to a resource-server request made on behalf of a session.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub authorization: CowStr<'static>,
    pub dpop: CowStr<'static>,
}

pub struct OAuthSession<T, S>
where
    T: OAuthResolver,
    S: ClientAuthStore,
{
    pub registry: Arc<SessionRegistry<T, S>>,
    pub client: Arc<T>,
    pub data: RwLock<ClientSessionData<'static>>,
}

impl<T, S> OAuthSession<T, S>
where
    T: OAuthResolver,
    S: ClientAuthStore,
{
    pub fn new(
        registry: Arc<SessionRegistry<T, S>>,
        client: Arc<T>,
        data: ClientSessionData<'static>,
    ) -> Self {
        Self {
            registry,
            client,
            data: RwLock::new(data),
        }
    }

    pub async fn session_info(&self) -> (Did<'_>, CowStr<'_>) {
        let data = self.data.read().await;
        (data.account_did.clone(), data.session_id.clone())
    }

    pub async fn endpoint(&self) -> Url {
        self.data.read().await.host_url.clone()
    }

    pub async fn access_token(&self) -> AuthorizationToken<'_> {
        AuthorizationToken::Dpop(self.data.read().await.token_set.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<AuthorizationToken<'_>> {
        self.data
            .read()
            .await
            .token_set
            .refresh_token
            .as_ref()
            .map(|t| AuthorizationToken::Dpop(t.clone()))
    }

    /// Whether the session currently holds an unexpired access token.
    pub async fn is_authorized(&self) -> bool {
        !self.data.read().await.is_expired()
    }
}

impl<T, S> OAuthSession<T, S>
where
    S: ClientAuthStore + Send + Sync + 'static,
    T: OAuthResolver + DpopExt + Send + Sync + 'static,
{
    /// Refresh the session's access token, persisting the new tokens.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn refresh(&self) -> Result<AuthorizationToken<'_>> {
        let (did, sid) = {
            let data = self.data.read().await;
            (data.account_did.clone(), data.session_id.clone())
        };
        let refreshed = self.registry.as_ref().get(&did, &sid, true).await?;
        let token = AuthorizationToken::Dpop(refreshed.token_set.access_token.clone());
        *self.data.write().await = refreshed.into_static();
        Ok(token)
    }

    /// Delete the underlying session (best-effort server revocation first).
    pub async fn logout(&self) -> Result<()> {
        let (did, sid) = self.session_info().await;
        let did = did.into_static();
        OAuthClient {
            registry: self.registry.clone(),
            client: self.client.clone(),
        }
        .revoke(&did, &sid)
        .await
    }

    /// Build the `Authorization`/`DPoP` header pair for a request to the
    /// session's resource server. Fails if the session's access token has
    /// expired; call [`OAuthSession::refresh`] first in that case.
    pub async fn auth_headers(&self, method: &str, url: &Url) -> Result<AuthHeaders> {
        if !self.is_authorized().await {
            return Err(session::Error::NotAuthorized.into());
        }

        let data = self.data.read().await;
        let access_token = data.token_set.access_token.clone();
        let ath = URL_SAFE_NO_PAD.encode(sha2::Sha256::digest(access_token.as_bytes()));
        let nonce = data.dpop_data.nonce(false);
        let proof = build_dpop_proof(
            &data.dpop_data.dpop_key,
            CowStr::Owned(method.to_uppercase().into()),
            CowStr::Owned(url.as_str().into()),
            nonce,
            Some(CowStr::Owned(ath.into())),
        )?;

        Ok(AuthHeaders {
            authorization: CowStr::Owned(format!("DPoP {access_token}").into()),
            dpop: proof.into_static(),
        })
    }
}
