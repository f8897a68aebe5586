mod account_list;
mod movement_list;
mod paged_list;
mod transaction_list;

pub use account_list::AccountListView;
pub use movement_list::MovementListView;
pub use transaction_list::TransactionListView;
