use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(CaseNo);
id_newtype!(ProcessNo);
id_newtype!(StepNo);
id_newtype!(TaskNo);
id_newtype!(StatusNo);
id_newtype!(ProcessDataNo);
id_newtype!(ProcessDataTypeNo);
id_newtype!(ProcessTypeNo);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Expands the single role string stored server-side into the granted role set.
    /// Admins implicitly hold the user role as well.
    pub fn expand(server_role: &str) -> Vec<Role> {
        if server_role.trim().eq_ignore_ascii_case("admin") {
            vec![Role::Admin, Role::User]
        } else {
            vec![Role::User]
        }
    }
}
