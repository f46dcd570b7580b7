//! Device authorization codes, addressed by user code.

use idvault_types::DeviceFlowCode;

use crate::error::RepoResult;
use crate::repository::EntityRepository;

impl EntityRepository<DeviceFlowCode> {
    pub async fn find_by_user_code(&self, user_code: &str) -> RepoResult<Option<DeviceFlowCode>> {
        self.find_by_key(user_code).await
    }

    /// Scan of the snapshot; device codes are not indexed.
    pub async fn find_by_device_code(&self, device_code: &str) -> RepoResult<Option<DeviceFlowCode>> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .find(|code| code.device_code == device_code))
    }

    /// Overwrite the code stored under `user_code`.
    ///
    /// Returns `false` without writing when no such code exists.
    pub async fn update_by_user_code(&self, user_code: &str, mut code: DeviceFlowCode) -> RepoResult<bool> {
        if self.find_by_key(user_code).await?.is_none() {
            return Ok(false);
        }
        code.user_code = user_code.to_string();
        self.store(code).await?;
        Ok(true)
    }

    pub async fn remove_by_device_code(&self, device_code: &str) -> RepoResult<bool> {
        match self.find_by_device_code(device_code).await? {
            Some(code) => self.remove(&code.user_code).await,
            None => Ok(false),
        }
    }
}
