//! # Team Personas
//!
//! Closed set of participant roles for collaborative analysis. Each role
//! carries its persona text as data, and each level has a fixed roster.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::model::Level;

/// A participant role in a refinement team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    // Context level
    ProductOwner,
    BusinessAnalyst,
    LeadSoftwareArchitect,
    // Container level
    SoftwareArchitect,
    LeadDeveloper,
    DevOpsSpecialist,
    SecuritySpecialist,
    // Component level
    ComponentLeadDeveloper,
    SeniorDeveloper,
    DatabaseAdministrator,
    ComponentSecuritySpecialist,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::ProductOwner => "Product Owner",
            Role::BusinessAnalyst => "Business Analyst",
            Role::LeadSoftwareArchitect => "Lead Software Architect",
            Role::SoftwareArchitect => "Software Architect",
            Role::LeadDeveloper => "Lead Developer",
            Role::DevOpsSpecialist => "DevOps Specialist",
            Role::SecuritySpecialist => "Security Specialist",
            Role::ComponentLeadDeveloper => "Lead Developer",
            Role::SeniorDeveloper => "Senior Developer",
            Role::DatabaseAdministrator => "Database Administrator",
            Role::ComponentSecuritySpecialist => "Security Specialist",
        }
    }

    /// Persona instructions for this role
    pub fn persona(&self) -> &'static str {
        match self {
            Role::ProductOwner => include_str!("defaults/personas/product_owner.md"),
            Role::BusinessAnalyst => include_str!("defaults/personas/business_analyst.md"),
            Role::LeadSoftwareArchitect => {
                include_str!("defaults/personas/lead_software_architect.md")
            }
            Role::SoftwareArchitect => include_str!("defaults/personas/software_architect.md"),
            Role::LeadDeveloper => include_str!("defaults/personas/lead_developer.md"),
            Role::DevOpsSpecialist => include_str!("defaults/personas/devops_specialist.md"),
            Role::SecuritySpecialist => include_str!("defaults/personas/security_specialist.md"),
            Role::ComponentLeadDeveloper => {
                include_str!("defaults/personas/component_lead_developer.md")
            }
            Role::SeniorDeveloper => include_str!("defaults/personas/senior_developer.md"),
            Role::DatabaseAdministrator => {
                include_str!("defaults/personas/database_administrator.md")
            }
            Role::ComponentSecuritySpecialist => {
                include_str!("defaults/personas/component_security_specialist.md")
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Ordered list of roles taking turns at one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    roles: Vec<Role>,
}

impl Roster {
    pub fn new(roles: Vec<Role>) -> Self {
        Self { roles }
    }

    /// The fixed roster for a level
    pub fn for_level(level: Level) -> Self {
        let roles = match level {
            Level::Context => vec![
                Role::ProductOwner,
                Role::BusinessAnalyst,
                Role::LeadSoftwareArchitect,
            ],
            Level::Container => vec![
                Role::SoftwareArchitect,
                Role::LeadDeveloper,
                Role::DevOpsSpecialist,
                Role::SecuritySpecialist,
            ],
            Level::Component => vec![
                Role::ComponentLeadDeveloper,
                Role::SeniorDeveloper,
                Role::DatabaseAdministrator,
                Role::ComponentSecuritySpecialist,
            ],
        };
        Self { roles }
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn get(&self, position: usize) -> Option<Role> {
        self.roles.get(position).copied()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rosters_per_level() {
        assert_eq!(Roster::for_level(Level::Context).len(), 3);
        assert_eq!(Roster::for_level(Level::Container).len(), 4);
        assert_eq!(
            Roster::for_level(Level::Component).get(2),
            Some(Role::DatabaseAdministrator)
        );
    }

    #[test]
    fn test_every_role_has_persona() {
        for level in Level::all() {
            for role in Roster::for_level(level).roles() {
                assert!(
                    role.persona().trim().len() > 40,
                    "persona for {:?} seems too short",
                    role
                );
            }
        }
    }

    #[test]
    fn test_rosters_do_not_overlap() {
        let context = Roster::for_level(Level::Context);
        let component = Roster::for_level(Level::Component);
        assert!(context.roles().iter().all(|r| !component.roles().contains(r)));
    }
}
