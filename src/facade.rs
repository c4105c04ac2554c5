//! Kernel Facade (spec §4.F): aggregates operations across the Stream and
//! Recording Supervisors, exposes start/stop/restart/status for one or all
//! cameras, and owns the shared lifecycle. Every method returns a
//! structured result; internal faults become status transitions rather
//! than propagating to the caller (spec §7).

use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Disks, System};
use tracing::{info, warn};

use crate::config::KernelConfig;
use crate::driver;
use crate::error::KernelError;
use crate::recording::{DiskShortfall, RecordingSupervisor};
use crate::registry::CameraRegistry;
use crate::status::{BulkResult, CameraStatus, DiskUsage, SystemStatus};
use crate::stream::StreamSupervisor;

pub struct KernelFacade {
    config: Arc<KernelConfig>,
    registry: Arc<CameraRegistry>,
    streams: Arc<StreamSupervisor>,
    recordings: Arc<RecordingSupervisor>,
}

impl KernelFacade {
    pub fn new(config: KernelConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(CameraRegistry::new(config.cam_config_path()));
        let streams = StreamSupervisor::new(config.clone(), config.transcoder_binary.clone());
        let recordings = RecordingSupervisor::new(config.clone(), config.transcoder_binary.clone());
        Arc::new(Self { config, registry, streams, recordings })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    fn resolve(&self, camera_id: &str) -> Result<crate::registry::CameraRecord, KernelError> {
        self.registry
            .get(camera_id)
            .map_err(|err| KernelError::Infrastructural { message: err.to_string() })?
            .ok_or_else(|| KernelError::UnknownCamera(camera_id.to_string()))
    }

    pub fn start_stream(&self, camera_id: &str) -> Result<(), KernelError> {
        let record = self.resolve(camera_id)?;
        self.streams.start_stream(camera_id, &record.rtsp_url).map_err(|err| KernelError::Transient {
            camera_id: camera_id.to_string(),
            message: err.to_string(),
        })
    }

    pub fn restart_stream(&self, camera_id: &str) -> Result<(), KernelError> {
        let record = self.resolve(camera_id)?;
        self.streams.restart_stream(camera_id, &record.rtsp_url).map_err(|err| KernelError::Transient {
            camera_id: camera_id.to_string(),
            message: err.to_string(),
        })
    }

    pub fn stop_stream(&self, camera_id: &str) -> Result<(), KernelError> {
        self.streams
            .stop_stream(camera_id)
            .map_err(|err| KernelError::Infrastructural { message: err.to_string() })
    }

    pub fn start_recording(&self, camera_id: &str) -> Result<(), KernelError> {
        let record = self.resolve(camera_id)?;
        self.recordings.start_recording(camera_id, &record.rtsp_url).map_err(|err| {
            if err.downcast_ref::<DiskShortfall>().is_some() {
                KernelError::ResourceShortfall { camera_id: camera_id.to_string(), message: err.to_string() }
            } else {
                KernelError::Transient { camera_id: camera_id.to_string(), message: err.to_string() }
            }
        })
    }

    pub fn stop_recording(&self, camera_id: &str) -> Result<(), KernelError> {
        self.recordings
            .stop_recording(camera_id)
            .map_err(|err| KernelError::Infrastructural { message: err.to_string() })
    }

    pub fn start_all_recordings(&self) -> BulkResult {
        let records = self.registry.load(false).unwrap_or_default();
        let mut result = BulkResult::new();
        for record in records.into_iter().filter(|record| record.auto_record.unwrap_or(false)) {
            match self.start_recording(&record.id) {
                Ok(()) => result.push_ok(record.id),
                Err(err) => result.push_err(record.id, err.to_string()),
            }
        }
        result
    }

    /// Idempotent; after the normal pass performs the escalation cascade
    /// (per-child terminate -> scorched-earth kill -> OS tree-kill by
    /// image name -> clear of all worker maps) and asserts the maps are
    /// empty afterward (spec §4.F).
    pub fn stop_all_recordings(&self) -> BulkResult {
        let camera_ids = self.recordings.active_camera_ids();
        let mut result = BulkResult::new();
        for camera_id in &camera_ids {
            match self.recordings.stop_recording(camera_id) {
                Ok(()) => result.push_ok(camera_id.clone()),
                Err(err) => result.push_err(camera_id.clone(), err.to_string()),
            }
        }

        if driver::any_transcoder_running(&self.config.transcoder_binary) {
            warn!("stop_all_recordings: transcoder processes survived the normal pass, escalating");
            driver::scorched_earth_kill(&self.config.transcoder_binary);
            std::thread::sleep(Duration::from_secs(1));

            for camera_id in &camera_ids {
                let _ = self.recordings.stop_recording(camera_id);
            }
        }

        assert_eq!(self.recordings.active_count(), 0, "stop_all_recordings must leave no live worker behind");
        info!(succeeded = result.succeeded.len(), failed = result.failed.len(), "stop_all_recordings completed");
        result
    }

    pub fn status(&self) -> SystemStatus {
        let mut system = System::new_all();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_percent = system.global_cpu_info().cpu_usage();
        let memory_percent = if system.total_memory() > 0 {
            (system.used_memory() as f64 / system.total_memory() as f64 * 100.0) as f32
        } else {
            0.0
        };

        let disks = Disks::new_with_refreshed_list();
        let disk_usage = disks
            .list()
            .iter()
            .map(|disk| DiskUsage {
                path: disk.mount_point().to_path_buf(),
                total_bytes: disk.total_space(),
                used_bytes: disk.total_space().saturating_sub(disk.available_space()),
                free_bytes: disk.available_space(),
            })
            .collect();

        let records = self.registry.load(false).unwrap_or_default();
        let per_camera = records
            .into_iter()
            .map(|record| CameraStatus {
                stream: self.streams.status(&record.id),
                recording: self.recordings.status(&record.id),
                camera_id: record.id,
            })
            .collect();

        SystemStatus {
            cpu_percent,
            memory_percent,
            disk_usage,
            active_streams: self.streams.active_count(),
            active_recordings: self.recordings.active_count(),
            per_camera,
        }
    }
}
