use serde_json::{json, Value};

/// Guardia de redacción para logging estructurado.
///
/// Antes de loguear cualquier payload opaco (acks de submit, metadata validada,
/// cuerpos de intents) el emisor lo pasa por [`guard`]. Si el payload contiene
/// una clave de la denylist o un valor con forma de seed del ledger, se
/// reemplaza COMPLETO por un aviso de redacción. Nunca se intenta redactar
/// campo por campo: un payload sospechoso se descarta entero.

/// Claves prohibidas en payloads logueados. El match es por substring sobre la
/// clave normalizada a minúsculas sin separadores, de modo que `issuerSeed`,
/// `master_key` y `privateKey` caen todos en la denylist.
const DENYLIST: &[&str] = &[
    "seed",
    "secret",
    "privatekey",
    "password",
    "masterkey",
    "passphrase",
    "mnemonic",
];

/// Retorna el payload listo para loguear: el original si está limpio, o el
/// aviso de redacción si contiene material secreto.
pub fn guard(payload: &Value) -> Value {
    if contains_secret(payload) {
        json!({ "redacted": "payload withheld: contains secret material" })
    } else {
        payload.clone()
    }
}

fn contains_secret(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(key, nested)| {
            is_denylisted_key(key) || contains_secret(nested)
        }),
        Value::Array(items) => items.iter().any(contains_secret),
        Value::String(s) => looks_like_seed(s),
        _ => false,
    }
}

fn is_denylisted_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();
    DENYLIST.iter().any(|banned| normalized.contains(banned))
}

/// Los seeds del ledger son cadenas base58 largas que comienzan con 's'.
fn looks_like_seed(value: &str) -> bool {
    value.len() > 20 && value.starts_with('s')
}
