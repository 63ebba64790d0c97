use kube::CustomResourceExt;
use multi_platform_types::TaskRun;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/tasks.multi-platform.dev_taskruns_crd.yaml",
        serde_yaml::to_string(&TaskRun::crd()).unwrap(),
    )
    .unwrap();
}
