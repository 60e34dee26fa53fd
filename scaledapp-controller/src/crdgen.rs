use kube::CustomResourceExt;
use scaledapp_api::ScaledApp;

/// Print the ScaledApp CRD so it can be piped into `kubectl apply -f -`.
fn main() {
    print!("{}", serde_yaml::to_string(&ScaledApp::crd()).expect("CRD serializes"));
}
