//! KYC submission and review. Approval is what moves an account out of
//! `pending`: passengers become `active`, drivers `verified`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{
    KycRecord, KycStatus, Notification, NotificationKind, ReviewKycRequest, SubmitKycRequest,
    User, UserRole, UserStatus,
};
use crate::AppState;

use super::auth::require_admin;
use super::error::ApiError;

/// Submit or resubmit a KYC bundle. A rejected record goes back to
/// `pending` with fresh documents; an approved record cannot be replaced.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<SubmitKycRequest>,
) -> Result<(StatusCode, Json<KycRecord>), ApiError> {
    if req.document_type.trim().is_empty() {
        return Err(ApiError::validation_field("document_type", "Document type is required"));
    }
    if req.document_number.trim().is_empty() {
        return Err(ApiError::validation_field(
            "document_number",
            "Document number is required",
        ));
    }
    if user.get_role() == UserRole::Driver && req.driver_license_number.is_none() {
        return Err(ApiError::validation_field(
            "driver_license_number",
            "Drivers must provide a license number",
        ));
    }

    let existing = KycRecord::find_by_user(&state.db, &user.id).await?;
    if let Some(record) = &existing {
        if record.get_status() == KycStatus::Approved {
            return Err(ApiError::conflict("KYC is already approved"));
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let id = match existing {
        Some(record) => {
            sqlx::query(
                "UPDATE kyc_records SET document_type = ?, document_number = ?, document_url = ?, \
                 selfie_url = ?, driver_license_number = ?, driver_license_url = ?, \
                 payment_method = ?, payment_account = ?, status = 'pending', \
                 rejection_reason = NULL, reviewed_by = NULL, reviewed_at = NULL, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(req.document_type.trim())
            .bind(req.document_number.trim())
            .bind(&req.document_url)
            .bind(&req.selfie_url)
            .bind(&req.driver_license_number)
            .bind(&req.driver_license_url)
            .bind(&req.payment_method)
            .bind(&req.payment_account)
            .bind(&now)
            .bind(&record.id)
            .execute(&state.db)
            .await?;
            record.id.clone()
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO kyc_records (id, user_id, document_type, document_number, document_url, \
                 selfie_url, driver_license_number, driver_license_url, payment_method, \
                 payment_account, status, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
            )
            .bind(&id)
            .bind(&user.id)
            .bind(req.document_type.trim())
            .bind(req.document_number.trim())
            .bind(&req.document_url)
            .bind(&req.selfie_url)
            .bind(&req.driver_license_number)
            .bind(&req.driver_license_url)
            .bind(&req.payment_method)
            .bind(&req.payment_account)
            .bind(&now)
            .bind(&now)
            .execute(&state.db)
            .await?;
            id
        }
    };

    let record = KycRecord::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("KYC record vanished after write"))?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// The caller's own KYC record. A missing record means "not yet
/// submitted" and is an expected condition, not a server fault.
pub async fn my_kyc(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<KycRecord>, ApiError> {
    let record = KycRecord::find_by_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("KYC not submitted yet"))?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct ListKycQuery {
    pub status: Option<String>,
}

/// Review queue, oldest submissions first. Admin only.
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<ListKycQuery>,
) -> Result<Json<Vec<KycRecord>>, ApiError> {
    require_admin(&user)?;

    let status = query
        .status
        .as_deref()
        .map(|s| {
            KycStatus::from_str(s)
                .ok_or_else(|| ApiError::validation_field("status", format!("Unknown status: {s}")))
        })
        .transpose()?
        .unwrap_or(KycStatus::Pending);

    let records = KycRecord::list_by_status(&state.db, status).await?;
    Ok(Json(records))
}

/// Approve or reject a submission. Approval activates the account;
/// rejection requires a reason the user will see.
pub async fn review(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<ReviewKycRequest>,
) -> Result<Json<KycRecord>, ApiError> {
    require_admin(&user)?;

    let record = KycRecord::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("KYC record not found"))?;
    if record.get_status() != KycStatus::Pending {
        return Err(ApiError::conflict("KYC record has already been reviewed"));
    }

    let applicant = User::find_by_id(&state.db, &record.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Applicant no longer exists"))?;

    if req.approve {
        KycRecord::review(&state.db, &id, KycStatus::Approved, None, &user.id).await?;

        // Approval gates the account status transition
        let new_status = match applicant.get_role() {
            UserRole::Driver => UserStatus::Verified,
            _ => UserStatus::Active,
        };
        User::set_status(&state.db, &applicant.id, new_status).await?;

        if let Err(e) = Notification::create(
            &state.db,
            &applicant.id,
            None,
            NotificationKind::KycApproved,
            "Verification approved",
            "Your account is now active",
        )
        .await
        {
            tracing::warn!(user_id = %applicant.id, error = %e, "Failed to create notification");
        }

        tracing::info!(user_id = %applicant.id, "KYC approved");
    } else {
        let reason = req
            .rejection_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ApiError::validation_field("rejection_reason", "Rejection requires a reason")
            })?;

        KycRecord::review(&state.db, &id, KycStatus::Rejected, Some(reason), &user.id).await?;

        if let Err(e) = Notification::create(
            &state.db,
            &applicant.id,
            None,
            NotificationKind::KycRejected,
            "Verification rejected",
            reason,
        )
        .await
        {
            tracing::warn!(user_id = %applicant.id, error = %e, "Failed to create notification");
        }

        tracing::info!(user_id = %applicant.id, reason = %reason, "KYC rejected");
    }

    let record = KycRecord::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("KYC record not found"))?;
    Ok(Json(record))
}
