//! GFS-Wave tile pipeline. All orchestration logic lives in `wx-engine`;
//! this binary only names which model profile it runs.

#[tokio::main]
async fn main() {
    let exit_code = wx_engine::run_model("gfs-wave").await;
    std::process::exit(exit_code);
}
