use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef},
    Decode, Encode, Postgres, Type,
};
use utoipa::ToSchema;

/// Enum stored as a TEXT column, with `as_str` + `FromStr` and sqlx encode/decode.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(format!("invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Type<Postgres> for $name {
            fn type_info() -> PgTypeInfo {
                <String as Type<Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <String as Type<Postgres>>::compatible(ty)
            }
        }

        impl<'q> Encode<'q, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
                <&str as Encode<'q, Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let raw = <&str as Decode<'r, Postgres>>::decode(value)?;
                Ok(raw.parse::<Self>()?)
            }
        }
    };
}

text_enum!(
    /// Account role. Each role owns a display-id prefix and counter row.
    Role {
        Admin => "admin",
        Doctor => "doctor",
        Staff => "staff",
        Patient => "patient",
    }
);

impl Role {
    pub fn prefix(&self) -> char {
        match self {
            Role::Admin => 'A',
            Role::Doctor => 'D',
            Role::Staff => 'S',
            Role::Patient => 'U',
        }
    }
}

text_enum!(AccommodationKind {
    Bed => "bed",
    Room => "room",
});

text_enum!(
    /// `Occupied` is held exactly while a patient is assigned.
    AccommodationStatus {
        Available => "available",
        Occupied => "occupied",
        Cleaning => "cleaning",
        Reserved => "reserved",
    }
);

text_enum!(
    /// Discharge sign-off steps, declared in the order they must be cleared.
    ClearanceStep {
        Nursing => "nursing",
        Pharmacy => "pharmacy",
        Billing => "billing",
    }
);

impl ClearanceStep {
    pub const ALL: [ClearanceStep; 3] = [
        ClearanceStep::Nursing,
        ClearanceStep::Pharmacy,
        ClearanceStep::Billing,
    ];

    /// Steps that must already be cleared before this one.
    pub fn prerequisites(&self) -> &'static [ClearanceStep] {
        match self {
            ClearanceStep::Nursing => &[],
            ClearanceStep::Pharmacy => &[ClearanceStep::Nursing],
            ClearanceStep::Billing => &[ClearanceStep::Nursing, ClearanceStep::Pharmacy],
        }
    }
}

text_enum!(BillStatus {
    Unpaid => "unpaid",
    Paid => "paid",
});
