//! Lifecycle loader: registers, provisions and activates extensions.
//!
//! `load_all` runs once per process, during start-up. Descriptors are
//! handled strictly one after another because provisioning writes to
//! shared settings, permission and role tables. A failing extension is
//! marked `failed` and skipped; the others still load.

use std::sync::Arc;

use semver::Version;

use crate::config::LoaderConfig;
use crate::descriptor::{ExtensionDescriptor, FeatureHandle};
use crate::error::ExtensionError;
use crate::migration::MigrationRunner;
use crate::provisioning::{
    NewRole, PermissionProvisioner, RoleProvisioner, SettingKind, SettingsProvisioner,
};
use crate::record::{ExtensionRecord, ExtensionStatus};
use crate::store::RegistryStore;

/// The collaborators first-install provisioning writes through.
#[derive(Clone)]
pub struct Provisioners {
    pub settings: Arc<dyn SettingsProvisioner>,
    pub permissions: Arc<dyn PermissionProvisioner>,
    pub roles: Arc<dyn RoleProvisioner>,
}

pub struct ExtensionLoader {
    store: Arc<dyn RegistryStore>,
    provisioners: Provisioners,
    config: LoaderConfig,
}

impl ExtensionLoader {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        provisioners: Provisioners,
        config: LoaderConfig,
    ) -> Self {
        Self {
            store,
            provisioners,
            config,
        }
    }

    /// Process `descriptors` in order and return the handles of every
    /// activated extension, in the same order.
    ///
    /// Only registry access errors (connectivity, record creation) abort
    /// the pass. Everything else is recorded on the failing extension.
    pub async fn load_all(
        &self,
        descriptors: &[ExtensionDescriptor],
    ) -> Result<Vec<FeatureHandle>, ExtensionError> {
        self.store.ping().await?;

        let mut handles = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let namespace = descriptor.namespace();
            let record = self
                .store
                .create_if_missing(&descriptor.registration())
                .await?;

            if !record.enabled {
                tracing::info!(namespace = %namespace, "extension disabled, skipping");
                continue;
            }
            if !descriptor.is_enabled() {
                tracing::info!(
                    namespace = %namespace,
                    "extension declared disabled by its descriptor, skipping"
                );
                continue;
            }

            match self.activate(descriptor, &record).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::error!(
                        namespace = %namespace,
                        status = %record.status,
                        "failed to load extension: {e}"
                    );
                    if let Err(mark_err) = self.store.mark_failed(namespace, &e.to_string()).await
                    {
                        tracing::error!(
                            namespace = %namespace,
                            "failed to record extension failure: {mark_err}"
                        );
                    }
                }
            }
        }

        tracing::info!(
            requested = descriptors.len(),
            activated = handles.len(),
            "extension load complete"
        );
        Ok(handles)
    }

    async fn activate(
        &self,
        descriptor: &ExtensionDescriptor,
        record: &ExtensionRecord,
    ) -> Result<FeatureHandle, ExtensionError> {
        let provisioning = self.provision(descriptor, record);
        match self.config.provision_timeout {
            Some(limit) => tokio::time::timeout(limit, provisioning)
                .await
                .map_err(|_| ExtensionError::Timeout(limit))??,
            None => provisioning.await?,
        }

        descriptor.build_feature()
    }

    async fn provision(
        &self,
        descriptor: &ExtensionDescriptor,
        record: &ExtensionRecord,
    ) -> Result<(), ExtensionError> {
        match record.status {
            ExtensionStatus::Pending => self.install(descriptor, record).await,
            ExtensionStatus::Installed => self.upgrade(descriptor, record).await,
            ExtensionStatus::Failed => {
                tracing::debug!(
                    namespace = %record.namespace,
                    "extension previously failed, skipping provisioning"
                );
                Ok(())
            }
        }
    }

    /// First install: hook, migrations, default settings, permissions.
    async fn install(
        &self,
        descriptor: &ExtensionDescriptor,
        record: &ExtensionRecord,
    ) -> Result<(), ExtensionError> {
        let namespace = descriptor.namespace();

        descriptor.initialize().await?;

        let target = Version::parse(descriptor.version())?;
        let runner = MigrationRunner::new(namespace, descriptor.migrations())?;
        runner.run_up(None, &target).await?;

        for setting in descriptor.default_settings() {
            self.provisioners
                .settings
                .create(
                    namespace,
                    &setting.key,
                    &setting.value,
                    SettingKind::of(&setting.value),
                )
                .await?;
        }

        for default in descriptor.default_permissions() {
            let permission = self
                .provisioners
                .permissions
                .create_permission(namespace, &default.name, &default.description)
                .await?;

            let mut roles = self.provisioners.roles.find_roles().await?;
            for role_name in &default.roles {
                let existing = roles.iter().find(|r| &r.name == role_name).map(|r| r.id);
                match existing {
                    Some(role_id) => {
                        self.provisioners
                            .roles
                            .assign_permissions(role_id, &[permission.id])
                            .await?;
                    }
                    None => {
                        let role = self
                            .provisioners
                            .roles
                            .create_role(NewRole {
                                name: role_name.clone(),
                                permissions: vec![permission.id],
                            })
                            .await?;
                        roles.push(role);
                    }
                }
            }
        }

        if record.version != descriptor.version() {
            self.store
                .set_version(namespace, descriptor.version())
                .await?;
        }
        self.store.mark_installed(namespace).await?;

        tracing::info!(
            namespace = %namespace,
            version = %descriptor.version(),
            settings = descriptor.default_settings().len(),
            permissions = descriptor.default_permissions().len(),
            "extension installed"
        );
        Ok(())
    }

    /// Already installed: only migrations introduced after the recorded
    /// version run.
    async fn upgrade(
        &self,
        descriptor: &ExtensionDescriptor,
        record: &ExtensionRecord,
    ) -> Result<(), ExtensionError> {
        if record.version == descriptor.version() {
            return Ok(());
        }

        let installed = Version::parse(&record.version)?;
        let target = Version::parse(descriptor.version())?;
        if target <= installed {
            if target < installed {
                tracing::warn!(
                    namespace = %record.namespace,
                    installed = %installed,
                    descriptor = %target,
                    "descriptor is older than the installed version, not migrating"
                );
            }
            return Ok(());
        }

        let runner = MigrationRunner::new(&record.namespace, descriptor.migrations())?;
        let applied = runner.run_up(Some(&installed), &target).await?;
        self.store
            .set_version(&record.namespace, descriptor.version())
            .await?;

        tracing::info!(
            namespace = %record.namespace,
            from = %installed,
            to = %target,
            migrations = applied,
            "extension upgraded"
        );
        Ok(())
    }
}
