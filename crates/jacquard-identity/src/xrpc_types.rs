//! Minimal request/response types for the two `com.atproto.identity` XRPC
//! queries this crate calls directly (`resolveHandle`, `resolveDid`).
//!
//! These are hand-written rather than generated, since pulling in full
//! lexicon codegen for two query endpoints isn't worth the dependency.

use jacquard_common::IntoStatic;
use jacquard_common::types::did::Did;
use jacquard_common::types::string::Handle;
use jacquard_common::xrpc::{GenericError, XrpcMethod, XrpcRequest, XrpcResp};
use serde::{Deserialize, Serialize};

/// `com.atproto.identity.resolveHandle` query params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveHandleParams<'a> {
    #[serde(borrow)]
    pub handle: Handle<'a>,
}

impl<'a> ResolveHandleParams<'a> {
    pub fn new(handle: Handle<'a>) -> Self {
        Self { handle }
    }
}

impl IntoStatic for ResolveHandleParams<'_> {
    type Output = ResolveHandleParams<'static>;
    fn into_static(self) -> Self::Output {
        ResolveHandleParams {
            handle: self.handle.into_static(),
        }
    }
}

/// Response marker for `resolveHandle`.
pub struct ResolveHandleResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveHandleOutput<'a> {
    #[serde(borrow)]
    pub did: Did<'a>,
}

impl IntoStatic for ResolveHandleOutput<'_> {
    type Output = ResolveHandleOutput<'static>;
    fn into_static(self) -> Self::Output {
        ResolveHandleOutput {
            did: self.did.into_static(),
        }
    }
}

impl XrpcRequest for ResolveHandleParams<'_> {
    const NSID: &'static str = "com.atproto.identity.resolveHandle";
    const METHOD: XrpcMethod = XrpcMethod::Query;
    type Response = ResolveHandleResponse;
}

impl XrpcResp for ResolveHandleResponse {
    const NSID: &'static str = "com.atproto.identity.resolveHandle";
    const ENCODING: &'static str = "application/json";
    type Output<'de> = ResolveHandleOutput<'de>;
    type Err<'de> = GenericError<'de>;
}

/// `com.atproto.identity.resolveDid` query params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDidParams<'a> {
    #[serde(borrow)]
    pub did: Did<'a>,
}

impl<'a> ResolveDidParams<'a> {
    pub fn new(did: Did<'a>) -> Self {
        Self { did }
    }
}

impl IntoStatic for ResolveDidParams<'_> {
    type Output = ResolveDidParams<'static>;
    fn into_static(self) -> Self::Output {
        ResolveDidParams {
            did: self.did.into_static(),
        }
    }
}

/// Response marker for `resolveDid`.
pub struct ResolveDidResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDidOutput<'a> {
    pub did_doc: serde_json::Value,
    #[serde(skip)]
    pub _marker: std::marker::PhantomData<&'a ()>,
}

impl IntoStatic for ResolveDidOutput<'_> {
    type Output = ResolveDidOutput<'static>;
    fn into_static(self) -> Self::Output {
        ResolveDidOutput {
            did_doc: self.did_doc,
            _marker: std::marker::PhantomData,
        }
    }
}

impl XrpcRequest for ResolveDidParams<'_> {
    const NSID: &'static str = "com.atproto.identity.resolveDid";
    const METHOD: XrpcMethod = XrpcMethod::Query;
    type Response = ResolveDidResponse;
}

impl XrpcResp for ResolveDidResponse {
    const NSID: &'static str = "com.atproto.identity.resolveDid";
    const ENCODING: &'static str = "application/json";
    type Output<'de> = ResolveDidOutput<'de>;
    type Err<'de> = GenericError<'de>;
}
