mod depth_limit;
