pub mod accommodation;
pub mod accommodation_input;
pub mod admission;
pub mod bill;
pub mod discharge;
pub mod enums;
pub mod lab_result;
pub mod message;
pub mod prescription;
pub mod user;
pub mod user_input;

pub use accommodation::{Accommodation, AccommodationEvent};
pub use accommodation_input::{AccommodationCommand, CreateAccommodationInput};
pub use admission::{Admission, AdmissionCharges};
pub use bill::{Bill, CreateBillInput};
pub use discharge::{ClearStepInput, DischargeClearance, DischargeProgress, DischargeStatus};
pub use enums::{AccommodationKind, AccommodationStatus, BillStatus, ClearanceStep, Role};
pub use lab_result::{CreateLabResultInput, LabResult};
pub use message::{Message, SendMessageInput};
pub use prescription::{CreatePrescriptionInput, Prescription};
pub use user::User;
pub use user_input::{CreateUserInput, OpenSessionInput, SessionResponse, SuccessResponse};
