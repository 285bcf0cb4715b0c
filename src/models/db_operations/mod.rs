pub mod forms_db_operations;
pub mod records_db_operations;
pub mod users_db_operations;
