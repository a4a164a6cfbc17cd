// 构建脚本: 链接FFmpeg依赖库
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // 仅在启用摄像头采集且为 Windows MSVC 时添加 FFmpeg 相关库
    let camera = std::env::var_os("CARGO_FEATURE_CAMERA").is_some();
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();

    if camera && target_os == "windows" && target_env == "msvc" {
        // Intel QSV (Quick Sync Video) 硬件加速
        println!("cargo:rustc-link-lib=dylib=libmfx");

        // x264 编码器
        println!("cargo:rustc-link-lib=dylib=libx264");

        // OLE 自动化和VFW (DirectShow 设备枚举)
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (TLS/SSL)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
