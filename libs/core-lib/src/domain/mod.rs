pub mod order;
pub mod tenant;
pub mod z_report;
