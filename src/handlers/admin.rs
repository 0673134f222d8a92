use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::checkin::resolver::clear_lab;
use crate::core::error::{AdminError, CoreError};
use crate::core::state::AppState;
use crate::models::admin::{
    AdminStatusResponse, AuthRequest, CardLinkRequest, ChangePinRequest, ClearLabResponse, LoginRequest, LoginResponse,
    LoginStatus, LookupQuery, LookupResponse, SidQuery, TrainingAddRequest, TrainingRemoveQuery, TypeSetQuery,
    UserSummary, ADMIN_TOKEN_HEADER,
};
use crate::models::audit::AdminAction;
use crate::models::kiosk::SuccessResponse;
use crate::models::user::{User, UserKey};
use crate::models::{Sid, Timestamp};
use crate::security::permissions::{assignable_types, check_type_change, is_staff_level, require_staff};
use crate::security::pin::{set_pin, verify_pin};
use crate::stores::repository::Repository;
use crate::stores::session_store::{AdminSession, SessionScope};
use crate::utils::time::now_millis;

const LOOKUP_LIMIT: usize = 20;

/// The admin behind a request, resolved from the session token
struct Admin {
    token: String,
    session: AdminSession,
    user: User,
    level: i32,
}

impl Admin {
    fn key(&self) -> UserKey {
        self.session.key()
    }
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(ADMIN_TOKEN_HEADER).and_then(|value| value.to_str().ok())
}

/// Resolve the session of any scope and re-check that its user is still staff
fn current_admin(state: &AppState, headers: &HeaderMap, now: Timestamp) -> Result<Admin, AdminError> {
    let token = session_token(headers).ok_or(AdminError::InvalidSession)?;
    let session = state.sessions.get(token, now).ok_or(AdminError::InvalidSession)?;
    let user = state.store.user(session.key()).ok_or(AdminError::InvalidSession)?;

    let level = state.store.level_of(&user);
    if !is_staff_level(level) {
        warn!(sid = user.sid, "Session holder is no longer staff, revoking");
        state.sessions.revoke(token);
        return Err(AdminError::PermissionDenied("admin functions".to_string()));
    }

    Ok(Admin {
        token: token.to_string(),
        session,
        user,
        level,
    })
}

/// Like `current_admin`, but setup-only sessions are refused
fn full_admin(state: &AppState, headers: &HeaderMap, now: Timestamp) -> Result<Admin, AdminError> {
    let admin = current_admin(state, headers, now)?;
    if admin.session.scope != SessionScope::Full {
        return Err(AdminError::PinSetupRequired);
    }
    Ok(admin)
}

fn audit(
    state: &AppState,
    admin: &Admin,
    action: AdminAction,
    target_id: Option<Sid>,
    data: serde_json::Value,
    now: Timestamp,
) -> Result<(), AdminError> {
    state
        .store
        .log_admin_action(admin.user.sid, action, target_id, data, admin.session.location_id, now)
        .map_err(CoreError::Persistence)?;
    Ok(())
}

fn lookup_path(sid: Sid) -> String {
    format!("/admin/lookup?sid={}", sid)
}

fn ok_json<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// First step of admin login, after the card tap
///
/// POST /admin/login  {sid, location_id}
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AdminError> {
    let key = UserKey::new(request.sid, request.location_id);
    let user = state
        .store
        .user(key)
        .ok_or_else(|| AdminError::NotFound(format!("User {}", request.sid)))?;

    if let Err(e) = require_staff(state.store.level_of(&user)) {
        warn!(sid = user.sid, location_id = key.location_id, "Admin login by non-staff user");
        return Err(e.into());
    }

    if !user.has_pin() {
        let token = state.sessions.issue(key, SessionScope::PinSetup, now_millis());
        info!(sid = user.sid, location_id = key.location_id, "Staff without PIN, issued setup session");
        return Ok(ok_json(LoginResponse {
            success: true,
            status: LoginStatus::PinSetup,
            token: Some(token),
            next: "/admin/change_pin".to_string(),
        }));
    }

    Ok(ok_json(LoginResponse {
        success: true,
        status: LoginStatus::PinRequired,
        token: None,
        next: "/admin/auth".to_string(),
    }))
}

/// PIN check; issues a full session
///
/// POST /admin/auth  {sid, location_id, pin}
pub async fn auth_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuthRequest>,
) -> Result<Response, AdminError> {
    let key = UserKey::new(request.sid, request.location_id);
    let user = state
        .store
        .user(key)
        .ok_or_else(|| AdminError::NotFound(format!("User {}", request.sid)))?;

    if let Err(e) = require_staff(state.store.level_of(&user)) {
        warn!(sid = user.sid, location_id = key.location_id, "Admin auth by non-staff user");
        return Err(e.into());
    }

    let store = Arc::clone(&state.store);
    let verified = tokio::task::spawn_blocking(move || verify_pin(store.as_ref(), key, &request.pin))
        .await
        .map_err(|e| {
            error!(error = %e, "PIN check panicked");
            AdminError::Internal
        })?;

    if !verified {
        warn!(sid = key.sid, location_id = key.location_id, "Invalid admin PIN");
        return Err(AdminError::InvalidPin);
    }

    let token = state.sessions.issue(key, SessionScope::Full, now_millis());
    info!(sid = key.sid, location_id = key.location_id, "Admin logged in");

    Ok(ok_json(LoginResponse {
        success: true,
        status: LoginStatus::Authenticated,
        token: Some(token),
        next: "/admin".to_string(),
    }))
}

/// POST /admin/logout
pub async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        if state.sessions.revoke(token) {
            info!("Admin logged out");
        }
    }

    ok_json(SuccessResponse::new("You have been logged out.").with_next("/success/logout"))
}

/// Current session details
///
/// GET /admin
pub async fn status_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AdminError> {
    let admin = current_admin(&state, &headers, now_millis())?;

    Ok(ok_json(AdminStatusResponse {
        sid: admin.user.sid,
        name: admin.user.name,
        level: admin.level,
        location_id: admin.session.location_id,
        scope: admin.session.scope,
    }))
}

/// Set or replace the admin's own PIN. Also the only action a setup
/// session may take; it is upgraded to a full session afterwards.
///
/// POST /admin/change_pin  {pin}
pub async fn change_pin_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChangePinRequest>,
) -> Result<Response, AdminError> {
    let now = now_millis();
    let admin = current_admin(&state, &headers, now)?;
    let key = admin.key();

    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || set_pin(store.as_ref(), key, &request.pin))
        .await
        .map_err(|e| {
            error!(error = %e, "PIN update panicked");
            AdminError::Internal
        })??;

    audit(&state, &admin, AdminAction::ChangePin, Some(key.sid), json!({}), now)?;

    state.sessions.revoke(&admin.token);
    let token = state.sessions.issue(key, SessionScope::Full, now);

    Ok(ok_json(LoginResponse {
        success: true,
        status: LoginStatus::Authenticated,
        token: Some(token),
        next: "/admin".to_string(),
    }))
}

/// Check everyone out of the admin's location and end the session
///
/// POST /admin/clear_lab
pub async fn clear_lab_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AdminError> {
    let now = now_millis();
    let admin = full_admin(&state, &headers, now)?;

    let closed = clear_lab(state.store.as_ref(), admin.session.location_id, now)?;
    audit(&state, &admin, AdminAction::ClearLab, None, json!({ "closed": closed.len() }), now)?;

    state.sessions.revoke(&admin.token);

    Ok(ok_json(ClearLabResponse {
        success: true,
        closed: closed.len(),
        next: "/success/checkout".to_string(),
    }))
}

/// Search users of the admin's location by sid and/or name prefix
///
/// GET /admin/lookup?sid=<sid>&name=<prefix>
pub async fn lookup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LookupQuery>,
) -> Result<Response, AdminError> {
    let admin = full_admin(&state, &headers, now_millis())?;
    let location_id = admin.session.location_id;

    let sid = params
        .sid
        .as_deref()
        .map(str::trim)
        .filter(|sid| !sid.is_empty())
        .map(|sid| {
            sid.parse::<Sid>()
                .map_err(|_| AdminError::Validation(format!("Invalid sid '{}'", sid)))
        })
        .transpose()?;
    let name = params.name.as_deref().map(str::trim).filter(|name| !name.is_empty());

    let users = state.store.find_users(location_id, sid, name, LOOKUP_LIMIT);

    let results: Vec<UserSummary> = users
        .iter()
        .map(|user| {
            let user_type = user.type_id.and_then(|id| state.store.user_type(id));
            let present = state.store.open_access(user.key()).is_some();
            UserSummary::new(user, user_type.as_ref(), present)
        })
        .collect();

    let mut response = LookupResponse {
        results,
        machines: None,
        trainings: None,
        types: None,
    };

    if let [target] = users.as_slice() {
        let machines = state.store.machines_at(location_id);
        let trainings = state
            .store
            .trainings_for(target.sid)
            .into_iter()
            .filter(|training| machines.iter().any(|m| m.id == training.machine_id))
            .collect();

        response.types = assignable_types(state.store.types_at(location_id), admin.level, state.store.level_of(target));
        response.trainings = Some(trainings);
        response.machines = Some(machines);
    }

    Ok(ok_json(response))
}

/// Require a user to sign the waiver again
///
/// POST /admin/clear_waiver?sid=<sid>
pub async fn clear_waiver_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SidQuery>,
) -> Result<Response, AdminError> {
    let now = now_millis();
    let admin = full_admin(&state, &headers, now)?;
    let key = UserKey::new(params.sid, admin.session.location_id);

    state
        .store
        .update_user(key, &mut |user| user.waiver_signed = None)
        .map_err(CoreError::Persistence)?
        .ok_or_else(|| AdminError::NotFound(format!("User {}", params.sid)))?;

    audit(&state, &admin, AdminAction::ClearWaiver, Some(params.sid), json!({}), now)?;
    info!(admin = admin.user.sid, sid = params.sid, "Waiver cleared");

    Ok(ok_json(
        SuccessResponse::new("Waiver cleared.").with_next(lookup_path(params.sid)),
    ))
}

/// Record that the admin trained a user on a machine
///
/// POST /admin/training/add  {student_id, machine}
pub async fn training_add_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<TrainingAddRequest>,
) -> Result<Response, AdminError> {
    let now = now_millis();
    let admin = full_admin(&state, &headers, now)?;
    let location_id = admin.session.location_id;

    if state.store.user(UserKey::new(request.student_id, location_id)).is_none() {
        return Err(AdminError::NotFound(format!("User {}", request.student_id)));
    }

    state
        .store
        .machine(request.machine)
        .filter(|machine| machine.location_id == location_id)
        .ok_or_else(|| AdminError::NotFound(format!("Machine {}", request.machine)))?;

    let training = state
        .store
        .add_training(request.student_id, admin.user.sid, request.machine, now)
        .map_err(CoreError::Persistence)?;

    audit(
        &state,
        &admin,
        AdminAction::AddTraining,
        Some(request.student_id),
        json!({ "training_id": training.id, "machine_id": training.machine_id }),
        now,
    )?;
    info!(
        admin = admin.user.sid,
        trainee = request.student_id,
        machine_id = request.machine,
        "Training recorded"
    );

    Ok(ok_json(training))
}

/// POST /admin/training/remove?id=<training id>
pub async fn training_remove_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<TrainingRemoveQuery>,
) -> Result<Response, AdminError> {
    let now = now_millis();
    let admin = full_admin(&state, &headers, now)?;
    let location_id = admin.session.location_id;

    // Trainings on another location's machines are invisible here
    let training = state
        .store
        .training(params.id)
        .filter(|training| {
            state
                .store
                .machine(training.machine_id)
                .is_some_and(|machine| machine.location_id == location_id)
        })
        .ok_or_else(|| AdminError::NotFound(format!("Training {}", params.id)))?;

    state
        .store
        .remove_training(training.id)
        .map_err(CoreError::Persistence)?;

    audit(
        &state,
        &admin,
        AdminAction::RemoveTraining,
        Some(training.trainee_id),
        json!({ "training_id": training.id, "machine_id": training.machine_id }),
        now,
    )?;

    Ok(ok_json(
        SuccessResponse::new("Training removed.").with_next(lookup_path(training.trainee_id)),
    ))
}

/// Link a replacement card to a user of the admin's location
///
/// POST /admin/card/link  {sid, card_id}
pub async fn card_link_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CardLinkRequest>,
) -> Result<Response, AdminError> {
    let now = now_millis();
    let admin = full_admin(&state, &headers, now)?;

    if state
        .store
        .user(UserKey::new(request.sid, admin.session.location_id))
        .is_none()
    {
        return Err(AdminError::NotFound(format!("User {}", request.sid)));
    }

    let linked = state
        .store
        .link_card(request.card_id, request.sid)
        .map_err(CoreError::Persistence)?;
    if linked.is_none() {
        warn!(admin = admin.user.sid, sid = request.sid, card = request.card_id, "Card belongs to another user");
        return Err(AdminError::Validation(format!(
            "Card {} is already registered to someone else",
            request.card_id
        )));
    }

    audit(
        &state,
        &admin,
        AdminAction::LinkCard,
        Some(request.sid),
        json!({ "card": request.card_id }),
        now,
    )?;
    info!(admin = admin.user.sid, sid = request.sid, card = request.card_id, "Card linked");

    Ok(ok_json(
        SuccessResponse::new("Card linked.").with_next(lookup_path(request.sid)),
    ))
}

/// Change a user's type, within the admin's own privilege
///
/// POST /admin/type/set?sid=<sid>&tid=<type id>
pub async fn type_set_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<TypeSetQuery>,
) -> Result<Response, AdminError> {
    let now = now_millis();
    let admin = full_admin(&state, &headers, now)?;
    let location_id = admin.session.location_id;

    let new_type = state
        .store
        .user_type(params.tid)
        .filter(|t| t.location_id == location_id)
        .ok_or_else(|| AdminError::NotFound(format!("Type {}", params.tid)))?;

    let key = UserKey::new(params.sid, location_id);
    let target = state
        .store
        .user(key)
        .ok_or_else(|| AdminError::NotFound(format!("User {}", params.sid)))?;

    if let Err(e) = check_type_change(admin.level, state.store.level_of(&target), new_type.level) {
        warn!(admin = admin.user.sid, sid = params.sid, type_id = params.tid, "Type change refused");
        return Err(e.into());
    }

    state
        .store
        .update_user(key, &mut |user| user.type_id = Some(new_type.id))
        .map_err(CoreError::Persistence)?
        .ok_or_else(|| AdminError::NotFound(format!("User {}", params.sid)))?;

    audit(
        &state,
        &admin,
        AdminAction::SetType,
        Some(params.sid),
        json!({ "from": target.type_id, "to": new_type.id }),
        now,
    )?;
    info!(admin = admin.user.sid, sid = params.sid, type_id = new_type.id, "User type changed");

    Ok(ok_json(
        SuccessResponse::new("Type updated.").with_next(lookup_path(params.sid)),
    ))
}
