pub mod audit;
pub mod backup;
pub mod db;
pub mod plans;
pub mod seed;
pub mod tenant;
