//! Entity re-exports.

pub use super::admin_funding_limits::Entity as AdminFundingLimits;
pub use super::balance_logs::Entity as BalanceLogs;
pub use super::balances::Entity as Balances;
pub use super::exchange_rates::Entity as ExchangeRates;
pub use super::manual_funds::Entity as ManualFunds;
pub use super::operational_group_types::Entity as OperationalGroupTypes;
pub use super::operational_groups::Entity as OperationalGroups;
pub use super::users::Entity as Users;
