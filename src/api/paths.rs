//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod semaphores {
    pub const LIST: &str = "/semaphores";
    pub const STATUS: &str = "/semaphores/:semaphore_id";
    pub const ACQUIRE: &str = "/semaphores/:semaphore_id/acquire";
    pub const RELEASE: &str = "/semaphores/:semaphore_id/release";
    pub const RESOURCES: &str = "/semaphores/:semaphore_id/resources";
}

pub fn status_path(semaphore_id: &str) -> String {
    semaphores::STATUS.replace(":semaphore_id", semaphore_id)
}

pub fn acquire_path(semaphore_id: &str) -> String {
    semaphores::ACQUIRE.replace(":semaphore_id", semaphore_id)
}

pub fn release_path(semaphore_id: &str) -> String {
    semaphores::RELEASE.replace(":semaphore_id", semaphore_id)
}

pub fn resources_path(semaphore_id: &str) -> String {
    semaphores::RESOURCES.replace(":semaphore_id", semaphore_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers_substitute_the_id() {
        assert_eq!(status_path("jobs"), "/semaphores/jobs");
        assert_eq!(acquire_path("jobs"), "/semaphores/jobs/acquire");
        assert_eq!(release_path("jobs"), "/semaphores/jobs/release");
        assert_eq!(resources_path("jobs"), "/semaphores/jobs/resources");
    }
}
