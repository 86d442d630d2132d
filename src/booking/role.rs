use serde::Serialize;
use uuid::Uuid;

/// Who is acting, resolved once when the session is authenticated.
///
/// Staff wins over any linked profile; otherwise a user is a doctor or a
/// patient depending on which profile row points at them. A user with neither
/// is a plain `Member` and can only browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Role {
    Staff,
    Doctor { doctor_id: Uuid },
    Patient { patient_id: Uuid },
    Member,
}

impl Role {
    pub fn resolve(is_staff: bool, doctor_id: Option<Uuid>, patient_id: Option<Uuid>) -> Self {
        match (is_staff, doctor_id, patient_id) {
            (true, _, _) => Role::Staff,
            (false, Some(doctor_id), _) => Role::Doctor { doctor_id },
            (false, None, Some(patient_id)) => Role::Patient { patient_id },
            (false, None, None) => Role::Member,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Staff)
    }

    pub fn patient_id(&self) -> Option<Uuid> {
        match self {
            Role::Patient { patient_id } => Some(*patient_id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Doctor { .. } => "doctor",
            Role::Patient { .. } => "patient",
            Role::Member => "member",
        }
    }

    /// Owning patient or staff.
    pub fn acts_for_patient(&self, owner: Uuid) -> bool {
        match self {
            Role::Staff => true,
            Role::Patient { patient_id } => *patient_id == owner,
            _ => false,
        }
    }
}
