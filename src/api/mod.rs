pub mod advance;
pub mod branch;
pub mod compensation;
pub mod dashboard;
pub mod document;
pub mod employee;
pub mod form;
pub mod institution;
pub mod leave_request;
pub mod payroll;
pub mod subscription;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;
