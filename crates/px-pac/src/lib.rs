//! PAC sandbox runtime
//!
//! Routes requests inside the PAC execution context from state delivered by
//! message. The WebAssembly exports below wrap a single process-wide
//! `PacRuntime`.

pub mod error;
pub mod message;
pub mod runtime;

use std::sync::OnceLock;

use wasm_bindgen::prelude::*;

pub use error::PacError;
pub use message::{PacMessage, PacSnapshot};
pub use runtime::{pac_result, proxy_config_request, PacRuntime, PacScriptData, ProxyConfigRequest};

static RUNTIME: OnceLock<PacRuntime> = OnceLock::new();

fn runtime() -> &'static PacRuntime {
    RUNTIME.get_or_init(PacRuntime::new)
}

fn console_warn(message: &str) {
    #[cfg(target_arch = "wasm32")]
    web_sys::console::warn_1(&JsValue::from_str(message));
    #[cfg(not(target_arch = "wasm32"))]
    log::warn!("{message}");
}

/// Load a full snapshot (the JSON payload of an `init` message).
#[wasm_bindgen]
pub fn init(snapshot_json: &str) -> Result<(), JsValue> {
    let snapshot: PacSnapshot = serde_json::from_str(snapshot_json).map_err(|e| {
        let message = format!("Failed to decode PAC snapshot: {e}");
        console_warn(&message);
        JsValue::from_str(&message)
    })?;
    runtime()
        .apply(PacMessage::Init(snapshot))
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Apply one `{"type": ..., "payload": ...}` message.
#[wasm_bindgen]
pub fn apply_message(message_json: &str) -> Result<(), JsValue> {
    runtime().apply_json(message_json).map_err(|e| {
        let message = e.to_string();
        console_warn(&message);
        JsValue::from_str(&message)
    })
}

#[wasm_bindgen(js_name = FindProxyForURL)]
pub fn find_proxy_for_url(url: &str, host: &str) -> String {
    runtime().find_proxy_for_url(url, host)
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    RUNTIME.get().is_some_and(PacRuntime::is_initialized)
}

#[wasm_bindgen]
pub fn get_state_info() -> JsValue {
    let result = js_sys::Object::new();
    match RUNTIME.get().filter(|runtime| runtime.is_initialized()) {
        Some(runtime) => {
            let mode = format!("{:?}", runtime.profile_type());
            let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(true));
            let _ = js_sys::Reflect::set(&result, &"proxyMode".into(), &JsValue::from_str(&mode));
            let _ = js_sys::Reflect::set(&result, &"ruleCount".into(), &JsValue::from(runtime.rule_count() as u32));
            let _ = js_sys::Reflect::set(&result, &"generation".into(), &JsValue::from(runtime.generation() as f64));
        }
        None => {
            let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(false));
        }
    }
    result.into()
}

/// Browser proxy-settings request for a mode, as a JS object.
#[wasm_bindgen]
pub fn proxy_config(proxy_mode: &str, pac_source: &str) -> Result<JsValue, JsValue> {
    let mode = serde_json::from_value(serde_json::Value::from(proxy_mode))
        .map_err(|e| JsValue::from_str(&format!("Unknown proxy mode '{proxy_mode}': {e}")))?;
    let request = proxy_config_request(mode, pac_source);
    let json = serde_json::to_string(&request).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&json)
}
