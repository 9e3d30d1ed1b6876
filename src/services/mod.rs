pub mod package_csv_service;
pub mod package_history_service;
pub mod package_service;
pub mod pricing_service;
pub mod quote_sync_service;
