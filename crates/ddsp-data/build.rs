fn main() {
    // Generate the tf.train.Example messages
    protobuf_codegen::Codegen::new()
        .pure()
        .includes(["src"])
        .input("src/protos/example.proto")
        .cargo_out_dir("tf-protos")
        .run_from_script();
}
