use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{canonical_usn, get_required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Look up the camera proof image for a student. One image per student is
/// retained (`<USN>.jpg`); the `date` parameter is accepted but does not take
/// part in filename resolution.
fn proof_lookup(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let usn = canonical_usn(&get_required_str(params, "studentUsn")?);
    if usn.is_empty() {
        return Err(HandlerErr::bad_params("studentUsn must not be empty"));
    }

    let Some(proofs_dir) = state.proofs_dir.as_ref() else {
        return Ok(json!({
            "exists": false,
            "path": null,
            "message": "proof directory not configured"
        }));
    };

    let fname = format!("{}.jpg", usn);
    let fpath = proofs_dir.join(&fname);

    if fpath.is_file() {
        return Ok(json!({
            "exists": true,
            "path": fpath.to_string_lossy()
        }));
    }

    Ok(json!({
        "exists": false,
        "path": null,
        "message": "no image available"
    }))
}

fn handle_proof_lookup(state: &mut AppState, req: &Request) -> serde_json::Value {
    match proof_lookup(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "proof.lookup" => Some(handle_proof_lookup(state, req)),
        _ => None,
    }
}
