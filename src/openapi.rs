use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hospital Management API",
        version = "1.0.0",
        description = "Ward occupancy, admissions and discharge clearance for the hospital management system"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    paths(
        // Health
        crate::handlers::health::health_check,

        // Auth
        crate::handlers::auth_handler::open_session,
        crate::handlers::auth_handler::get_me,
        crate::handlers::auth_handler::logout,

        // Users
        crate::handlers::users_handler::get_users,
        crate::handlers::users_handler::get_user,
        crate::handlers::users_handler::create_user,

        // Accommodations
        crate::handlers::accommodations_handler::get_accommodations,
        crate::handlers::accommodations_handler::get_accommodation,
        crate::handlers::accommodations_handler::create_accommodation,
        crate::handlers::accommodations_handler::apply_command,
        crate::handlers::accommodations_handler::get_accommodation_events,

        // Admissions
        crate::handlers::admissions_handler::get_admissions,
        crate::handlers::admissions_handler::get_admission,
        crate::handlers::admissions_handler::get_admission_charges,
        crate::handlers::admissions_handler::create_admission_invoice,

        // Discharge
        crate::handlers::discharge_handler::get_discharge_status,
        crate::handlers::discharge_handler::initiate_discharge,
        crate::handlers::discharge_handler::clear_step,

        // Clinical records
        crate::handlers::prescriptions_handler::get_patient_prescriptions,
        crate::handlers::prescriptions_handler::create_prescription,
        crate::handlers::lab_results_handler::get_patient_lab_results,
        crate::handlers::lab_results_handler::create_lab_result,

        // Billing
        crate::handlers::bills_handler::get_patient_bills,
        crate::handlers::bills_handler::create_bill,
        crate::handlers::bills_handler::pay_bill,

        // Messages
        crate::handlers::messages_handler::get_inbox,
        crate::handlers::messages_handler::send_message,
        crate::handlers::messages_handler::mark_read,
    ),
    components(
        schemas(
            // Core models
            crate::models::User,
            crate::models::Role,
            crate::models::Accommodation,
            crate::models::AccommodationEvent,
            crate::models::AccommodationKind,
            crate::models::AccommodationStatus,
            crate::models::Admission,
            crate::models::AdmissionCharges,
            crate::models::ClearanceStep,
            crate::models::DischargeClearance,
            crate::models::DischargeProgress,
            crate::models::DischargeStatus,
            crate::models::Prescription,
            crate::models::LabResult,
            crate::models::Bill,
            crate::models::BillStatus,
            crate::models::Message,

            // Input models
            crate::models::CreateUserInput,
            crate::models::OpenSessionInput,
            crate::models::CreateAccommodationInput,
            crate::models::AccommodationCommand,
            crate::models::ClearStepInput,
            crate::models::CreatePrescriptionInput,
            crate::models::CreateLabResultInput,
            crate::models::CreateBillInput,
            crate::models::SendMessageInput,

            // Responses
            crate::models::SessionResponse,
            crate::models::SuccessResponse,
            crate::handlers::accommodations_handler::CommandResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check"),
        (name = "auth", description = "Session issuance and sign-out"),
        (name = "users", description = "User accounts and display ids"),
        (name = "accommodations", description = "Beds, rooms and occupancy commands"),
        (name = "admissions", description = "Admission ledger and stay charges"),
        (name = "discharge", description = "Ordered discharge clearance"),
        (name = "prescriptions", description = "Prescriptions"),
        (name = "lab-results", description = "Laboratory results"),
        (name = "billing", description = "Patient bills"),
        (name = "messages", description = "Internal messaging"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "service_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Service-Key"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_workflow_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/accommodations/{id}/commands",
            "/api/admissions/{id}/discharge/{step}",
            "/api/auth/session",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }

        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
        assert!(schemes.contains_key("service_key"));
    }
}
