//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Seeded `name` column value.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }

            /// Look up a variant by its database ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( v if v == $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Job execution status, shared by the queue and every owning record.
    JobStatus {
        Pending = 1 => "pending",
        Running = 2 => "running",
        Success = 3 => "success",
        Failure = 4 => "failure",
        Revoked = 5 => "revoked",
    }
}

impl JobStatus {
    /// Success, failure and revoked never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }

    /// Legal edges: pending -> running | revoked, running -> any terminal.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Revoked),
            Self::Running => next.is_terminal(),
            Self::Success | Self::Failure | Self::Revoked => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_ids_match_seed_data() {
        assert_eq!(JobStatus::Pending.id(), 1);
        assert_eq!(JobStatus::Running.id(), 2);
        assert_eq!(JobStatus::Success.id(), 3);
        assert_eq!(JobStatus::Failure.id(), 4);
        assert_eq!(JobStatus::Revoked.id(), 5);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = JobStatus::Revoked.into();
        assert_eq!(id, 5);
    }

    #[test]
    fn from_id_inverts_id() {
        for id in 1..=5 {
            assert_eq!(JobStatus::from_id(id).map(JobStatus::id), Some(id));
        }
        assert_eq!(JobStatus::from_id(0), None);
        assert_eq!(JobStatus::from_id(6), None);
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [JobStatus::Success, JobStatus::Failure, JobStatus::Revoked] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(JobStatus::Running));
            assert!(!terminal.can_transition_to(JobStatus::Pending));
        }
    }

    #[test]
    fn pending_may_be_revoked_but_not_finished() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Revoked));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Success));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Failure));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failure));
    }

    #[test]
    fn display_uses_seed_name() {
        assert_eq!(JobStatus::Success.to_string(), "success");
    }
}
