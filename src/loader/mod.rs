//! Data loader planning.
//!
//! A [`LoaderPlan`] is everything a loader needs to stream training records
//! out of a tensor store: which tensors to fetch, how boxes are encoded,
//! how samples are ordered and batched, and the pipeline to apply. The
//! worker processes themselves belong to the loader implementation.

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::bbox::FormatDescriptor;
use crate::config::{prepare_pipeline, DataloaderImpl, LoaderSettings, PipelineStep};
use crate::dataset::{TensorBindings, TensorNames};
use crate::error::DetbridgeError;
use crate::store::TensorStore;
use crate::transform::{transform_sample, RecordPipeline, Sample, TrainingRecord};

/// Resolved plan for one data loader.
#[derive(Clone, Debug, Serialize)]
pub struct LoaderPlan {
    pub implementation: DataloaderImpl,
    pub bindings: TensorBindings,
    /// Tensors fetched per sample, in fetch order.
    pub tensors: Vec<String>,
    /// Coordinate metadata of the box tensor.
    pub descriptor: FormatDescriptor,
    pub classes: Vec<String>,
    pub pipeline: Vec<PipelineStep>,
    pub settings: LoaderSettings,
    /// Samples in the store.
    pub len: usize,
}

impl LoaderPlan {
    /// Builds a plan against `store`.
    ///
    /// # Errors
    /// Fails when a tensor cannot be resolved, when the batch size is zero,
    /// or when the native loader is asked for more than one worker.
    pub fn build<S: TensorStore + ?Sized>(
        store: &S,
        names: &TensorNames,
        settings: &LoaderSettings,
        implementation: DataloaderImpl,
        pipeline: &[PipelineStep],
    ) -> Result<Self, DetbridgeError> {
        if settings.samples_per_gpu == 0 {
            return Err(DetbridgeError::InvalidLoaderSettings {
                message: "samples_per_gpu must be greater than 0".to_string(),
            });
        }
        if implementation == DataloaderImpl::Native && settings.workers_per_gpu >= 2 {
            return Err(DetbridgeError::InvalidLoaderSettings {
                message: format!(
                    "the c++ loader supports at most 1 worker per gpu, got {}",
                    settings.workers_per_gpu
                ),
            });
        }

        let bindings = TensorBindings::resolve(store, names)?;
        let descriptor = store
            .info(&bindings.boxes)
            .map(|info| info.coords.clone())
            .unwrap_or_default();
        let classes = store
            .info(&bindings.labels)
            .map(|info| info.class_names.clone())
            .unwrap_or_default();

        let plan = Self {
            implementation,
            tensors: bindings.loader_tensors(),
            bindings,
            descriptor,
            classes,
            pipeline: prepare_pipeline(pipeline),
            settings: settings.clone(),
            len: store.len(),
        };

        tracing::info!(
            implementation = %plan.implementation,
            mode = %plan.settings.mode,
            samples = plan.len,
            batch_size = plan.batch_size(),
            workers = plan.settings.workers_per_gpu,
            "planned data loader"
        );

        Ok(plan)
    }

    pub fn batch_size(&self) -> usize {
        self.settings.samples_per_gpu
    }

    /// Sample order for one pass over the store.
    pub fn epoch_order(&self) -> Vec<usize> {
        epoch_order(self.len, self.settings.shuffle, self.settings.seed)
    }

    /// Splits an order into consecutive batches. The last may be short.
    pub fn batches<'a>(&self, order: &'a [usize]) -> impl Iterator<Item = &'a [usize]> + 'a {
        order.chunks(self.batch_size())
    }

    /// Reads sample `index` and turns it into a training record.
    pub fn load_record<S, P>(
        &self,
        store: &S,
        index: usize,
        pipeline: &P,
    ) -> Result<TrainingRecord, DetbridgeError>
    where
        S: TensorStore + ?Sized,
        P: RecordPipeline + ?Sized,
    {
        let sample = Sample {
            image: store.image(&self.bindings.images, index)?,
            boxes: store.boxes(&self.bindings.boxes, index)?,
            labels: store.labels(&self.bindings.labels, index)?,
            masks: self
                .bindings
                .masks
                .as_deref()
                .map(|tensor| store.mask(tensor, index))
                .transpose()?,
        };
        transform_sample(sample, &self.descriptor, pipeline)
    }

    /// Loads every record of one batch.
    pub fn load_batch<S, P>(
        &self,
        store: &S,
        batch: &[usize],
        pipeline: &P,
    ) -> Result<Vec<TrainingRecord>, DetbridgeError>
    where
        S: TensorStore + ?Sized,
        P: RecordPipeline + ?Sized,
    {
        batch
            .iter()
            .map(|&index| self.load_record(store, index, pipeline))
            .collect()
    }
}

/// Indices `0..len`, shuffled when `shuffle` is set.
///
/// A seed gives a reproducible order; without one the thread RNG is used.
pub fn epoch_order(len: usize, shuffle: bool, seed: Option<u64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        if let Some(seed) = seed {
            let mut rng = StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        } else {
            let mut rng = rand::rng();
            order.shuffle(&mut rng);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{train_loader_settings, val_loader_settings, TrainConfig};
    use crate::store::{Htype, InMemoryStore, StoredTensor, TensorInfo};
    use crate::transform::IdentityPipeline;
    use ndarray::{arr1, array, Array};

    fn store() -> InMemoryStore {
        let mut images = StoredTensor::new("images", Htype::Image);
        let mut boxes = StoredTensor::new("boxes", Htype::BBox).with_info(TensorInfo {
            coords: FormatDescriptor::empty().with_mode("CCWH").with_type("pixel"),
            ..Default::default()
        });
        let mut labels = StoredTensor::new("labels", Htype::ClassLabel).with_info(TensorInfo {
            class_names: vec!["person".into()],
            ..Default::default()
        });
        for i in 0..5 {
            images.push_sample(Array::<f64, _>::from_elem((8, 10, 3), i as f64).into_dyn());
            boxes.push_sample(array![[5.0, 4.0, 4.0, 2.0]].into_dyn());
            labels.push_sample(arr1(&[0.0]).into_dyn());
        }
        InMemoryStore::default()
            .with_tensor(images)
            .with_tensor(boxes)
            .with_tensor(labels)
    }

    fn settings() -> LoaderSettings {
        let mut settings = train_loader_settings(&TrainConfig::default(), false);
        settings.samples_per_gpu = 2;
        settings.workers_per_gpu = 1;
        settings.seed = Some(7);
        settings
    }

    fn plan() -> LoaderPlan {
        LoaderPlan::build(
            &store(),
            &TensorNames::default(),
            &settings(),
            DataloaderImpl::Native,
            &[PipelineStep::new("LoadImageFromFile"), PipelineStep::new("Resize")],
        )
        .unwrap()
    }

    #[test]
    fn test_build_resolves_tensors() {
        let plan = plan();
        assert_eq!(plan.tensors, vec!["images", "labels", "boxes"]);
        assert_eq!(plan.descriptor.mode(), Some("CCWH"));
        assert_eq!(plan.classes, vec!["person"]);
        assert_eq!(plan.pipeline, vec![PipelineStep::new("Resize")]);
        assert_eq!(plan.len, 5);
    }

    #[test]
    fn test_native_rejects_many_workers() {
        let mut settings = settings();
        settings.workers_per_gpu = 2;
        let err = LoaderPlan::build(
            &store(),
            &TensorNames::default(),
            &settings,
            DataloaderImpl::Native,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, DetbridgeError::InvalidLoaderSettings { .. }));

        assert!(LoaderPlan::build(
            &store(),
            &TensorNames::default(),
            &settings,
            DataloaderImpl::Python,
            &[],
        )
        .is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut settings = settings();
        settings.samples_per_gpu = 0;
        assert!(matches!(
            LoaderPlan::build(
                &store(),
                &TensorNames::default(),
                &settings,
                DataloaderImpl::Python,
                &[],
            ),
            Err(DetbridgeError::InvalidLoaderSettings { .. })
        ));
    }

    #[test]
    fn test_epoch_order() {
        assert_eq!(epoch_order(4, false, Some(1)), vec![0, 1, 2, 3]);

        let a = epoch_order(50, true, Some(9));
        let b = epoch_order(50, true, Some(9));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());

        assert_eq!(epoch_order(30, true, None).len(), 30);
    }

    #[test]
    fn test_batches_cover_order() {
        let plan = plan();
        let order = plan.epoch_order();
        let batches: Vec<&[usize]> = plan.batches(&order).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches.concat(), order);
    }

    #[test]
    fn test_val_order_is_sequential() {
        let settings = val_loader_settings(&TrainConfig::default(), false);
        let plan = LoaderPlan::build(
            &store(),
            &TensorNames::default(),
            &settings,
            DataloaderImpl::Native,
            &[],
        )
        .unwrap();
        assert_eq!(plan.epoch_order(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_load_record_converts_boxes() {
        let plan = plan();
        let store = store();
        let record = plan.load_record(&store, 3, &IdentityPipeline).unwrap();
        assert_eq!(record.gt_bboxes, array![[3.0, 3.0, 7.0, 5.0]]);
        assert_eq!(record.img[[0, 0, 0]], 3);
        assert_eq!(record.gt_labels, vec![0]);
        assert!(record.gt_masks.is_none());

        let batch = plan.load_batch(&store, &[0, 4], &IdentityPipeline).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(plan.load_record(&store, 5, &IdentityPipeline).is_err());
    }
}
