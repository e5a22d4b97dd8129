use axum::response::Html;

const UPLOAD_PAGE: &str = r#"<!doctype html>
<html>
    <head>
        <title>Upload a video</title>
    </head>
    <body>
        <h1>Upload a video</h1>
        <form id="upload" action="/upload" method="post" enctype="multipart/form-data">
            <div>
                <label>
                    Video file:
                    <input type="file" name="file" accept="video/*">
                </label>
            </div>
            <div>
                <input type="submit" value="Upload">
            </div>
        </form>
        <pre id="status"></pre>
        <script>
            const form = document.getElementById("upload");
            const log = document.getElementById("status");
            form.addEventListener("submit", async (event) => {
                event.preventDefault();
                log.textContent = "";
                const response = await fetch(form.action, { method: "POST", body: new FormData(form) });
                if (!response.ok) {
                    log.textContent = await response.text();
                    return;
                }
                const reader = response.body.pipeThrough(new TextDecoderStream()).getReader();
                let buffer = "";
                for (;;) {
                    const { value, done } = await reader.read();
                    if (done) break;
                    buffer += value;
                    const frames = buffer.split("\n\n");
                    buffer = frames.pop();
                    for (const frame of frames) {
                        const data = frame.split("\n").find((line) => line.startsWith("data:"));
                        if (!data) continue;
                        const status = JSON.parse(data.slice(5));
                        log.textContent += status.message + (status.error ? ": " + status.error : "") + "\n";
                        if (status.url) log.textContent += JSON.stringify(status.url, null, 2) + "\n";
                    }
                }
            });
        </script>
    </body>
</html>
"#;

pub async fn root() -> Html<&'static str> {
    Html(UPLOAD_PAGE)
}
