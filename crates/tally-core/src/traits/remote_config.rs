/// Remote configuration collaborator, asked to re-pull when collection is
/// re-enabled. Its result is not interpreted by the pipeline.
pub trait RemoteConfig: Send + Sync {
    fn pull(&self);
}
