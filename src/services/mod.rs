pub mod metadata_store;
pub mod object_store;
pub mod sniff;
pub mod storage_service;
pub mod validation;
