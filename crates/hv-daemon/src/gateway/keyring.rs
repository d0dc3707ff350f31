//! Keyring gateway: key management and signing

use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Router;

use hv_core::ipc::{
    routes, AddKeyRequest, GetKeysRequest, KeyInfo, KeyNameRequest, SignRequest, SignResponse,
};
use hv_core::traits::{Keyring, KeyringAccess, NewKey};
use hv_core::{ClientError, KeyringError};

use super::response::{created, done, ok, ApiError, ApiJson, ApiResult};

type SharedKeyring = Arc<dyn Keyring>;

/// Routes served by the keyring daemon, relative to the API prefix
pub fn router(keyring: SharedKeyring) -> Router {
    Router::new()
        .route(routes::KEYRING_ADD_KEY, post(add_key))
        .route(routes::KEYRING_GET_KEYS, post(get_keys))
        .route(routes::KEYRING_GET_KEY, post(get_key))
        .route(routes::KEYRING_SIGN_MESSAGE, post(sign))
        .route(routes::KEYRING_SIGN_BYTES, post(sign))
        .route(routes::KEYRING_DELETE_KEY, post(delete_key))
        .with_state(keyring)
}

/// Run a keyring call on the blocking pool
async fn blocking<T, F>(keyring: SharedKeyring, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Keyring) -> Result<T, KeyringError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(keyring.as_ref()))
        .await
        .map_err(|e| ClientError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
    Ok(result?)
}

async fn add_key(
    State(keyring): State<SharedKeyring>,
    ApiJson(req): ApiJson<AddKeyRequest>,
) -> ApiResult<KeyInfo> {
    let backend = req.validate()?;
    let access = KeyringAccess::new(backend, req.auth.password);
    let key = NewKey {
        name: req.name,
        mnemonic: req.mnemonic,
        bip39_password: req.bip39_password,
        coin_type: req.coin_type,
        account: req.account,
        index: req.index,
    };

    let info = blocking(keyring, move |k| k.add(&access, key)).await?;
    created(info)
}

async fn get_keys(
    State(keyring): State<SharedKeyring>,
    ApiJson(req): ApiJson<GetKeysRequest>,
) -> ApiResult<Vec<KeyInfo>> {
    let access = KeyringAccess::new(req.validate()?, req.auth.password);
    ok(blocking(keyring, move |k| k.list(&access)).await?)
}

async fn get_key(
    State(keyring): State<SharedKeyring>,
    ApiJson(req): ApiJson<KeyNameRequest>,
) -> ApiResult<KeyInfo> {
    let access = KeyringAccess::new(req.validate()?, req.auth.password);
    let name = req.name;
    ok(blocking(keyring, move |k| k.get(&access, &name)).await?)
}

async fn sign(
    State(keyring): State<SharedKeyring>,
    ApiJson(req): ApiJson<SignRequest>,
) -> ApiResult<SignResponse> {
    let (backend, bytes) = req.validate()?;
    let access = KeyringAccess::new(backend, req.auth.password);
    let name = req.name;
    ok(blocking(keyring, move |k| k.sign(&access, &name, &bytes)).await?)
}

async fn delete_key(
    State(keyring): State<SharedKeyring>,
    ApiJson(req): ApiJson<KeyNameRequest>,
) -> ApiResult<()> {
    let backend = req.validate()?;
    let access = KeyringAccess::new(backend, req.auth.password);
    let name = req.name.clone();
    blocking(keyring, move |k| k.delete(&access, &name)).await?;
    tracing::info!("Deleted key {} from the {} keyring", req.name, backend);
    done()
}
