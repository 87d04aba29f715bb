//! Order lifecycle and actor roles.
//!
//! Order statuses and user roles are stored as TEXT; this module owns the
//! parse tables, the legal status-transition graph and the role capabilities
//! so every service validates against one source of truth.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Delivering,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivering,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Legal moves only walk the chain forward; cancellation is possible
    /// while the food has not left the restaurant.
    pub fn may_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Preparing)
                | (Confirmed, Cancelled)
                | (Preparing, Ready)
                | (Preparing, Cancelled)
                | (Ready, Delivering)
                | (Delivering, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Entering `delivering` is only meaningful with a driver attached.
    pub fn requires_driver(self) -> bool {
        matches!(self, OrderStatus::Delivering)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Owner,
    Agent,
    Admin,
    Manager,
    Driver,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Customer,
        Role::Owner,
        Role::Agent,
        Role::Admin,
        Role::Manager,
        Role::Driver,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Owner => "owner",
            Role::Agent => "agent",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Driver => "driver",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == value)
    }

    /// Roles that may pick up and complete deliveries.
    pub fn can_deliver(self) -> bool {
        matches!(self, Role::Driver | Role::Agent)
    }

    /// Roles open to self-service registration. Admin and manager accounts
    /// are provisioned out of band (see the seed binary).
    pub fn self_registrable(self) -> bool {
        matches!(self, Role::Customer | Role::Owner | Role::Driver | Role::Agent)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_the_chain_forward() {
        let chain = [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Delivering,
            OrderStatus::Delivered,
        ];
        for pair in chain.windows(2) {
            assert!(
                pair[0].may_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn cancellation_only_before_handoff() {
        assert!(OrderStatus::Pending.may_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.may_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Preparing.may_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Ready.may_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivering.may_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn terminal_states_have_no_exit() {
        for target in OrderStatus::ALL {
            assert!(!OrderStatus::Delivered.may_transition_to(target));
            assert!(!OrderStatus::Cancelled.may_transition_to(target));
        }
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
    }

    #[test]
    fn no_skipping_and_no_rewinding() {
        assert!(!OrderStatus::Pending.may_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Pending.may_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Confirmed.may_transition_to(OrderStatus::Delivering));
        assert!(!OrderStatus::Delivering.may_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Confirmed.may_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn self_transition_is_rejected() {
        for status in OrderStatus::ALL {
            assert!(!status.may_transition_to(status), "{status} -> {status}");
        }
    }

    #[test]
    fn status_strings_round_trip() {
        assert_eq!(OrderStatus::parse("preparing"), Some(OrderStatus::Preparing));
        assert_eq!(OrderStatus::parse("shipped"), None);
        assert_eq!(OrderStatus::parse("Pending"), None);
        assert_eq!(OrderStatus::Delivering.as_str(), "delivering");
    }

    #[test]
    fn only_delivering_needs_a_driver() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.requires_driver(),
                status == OrderStatus::Delivering,
                "{status}"
            );
        }
    }

    #[test]
    fn delivery_capable_roles() {
        assert!(Role::Driver.can_deliver());
        assert!(Role::Agent.can_deliver());
        assert!(!Role::Customer.can_deliver());
        assert!(!Role::Owner.can_deliver());
        assert!(!Role::Admin.can_deliver());
    }

    #[test]
    fn privileged_roles_cannot_self_register() {
        assert!(!Role::Admin.self_registrable());
        assert!(!Role::Manager.self_registrable());
        assert!(Role::Customer.self_registrable());
        assert!(Role::Owner.self_registrable());
        assert!(Role::Driver.self_registrable());
        assert_eq!(Role::parse("agent"), Some(Role::Agent));
        assert_eq!(Role::parse("root"), None);
    }
}
